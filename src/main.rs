use anyhow::{Context, Result, bail};
use bmctty::{PowerControl, Session, Shell};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "bmctty",
    about = "Drive a BMC management CLI and the host console behind it",
    version
)]
struct Args {
    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and walk through the main capabilities
    Demo {
        /// Target as user:pass@host
        target: String,

        /// Attempt a host console login over the bridge with user:pass
        #[arg(long)]
        serial_login: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Command::Demo {
            target,
            serial_login,
        } => demo(&target, serial_login.as_deref()).await,
    }
}

async fn demo(target: &str, serial_login: Option<&str>) -> Result<()> {
    let (user, pass, host) = parse_target(target)?;

    let mut session = Session::connect(host, user, pass)
        .await
        .context("failed to open session")?;
    println!("Connected to {session}");

    let power = session
        .power_state()
        .await
        .context("failed to read power state")?;
    println!("system is powered {power}");

    let redfish = session
        .redfish_info()
        .await
        .context("failed to read redfish info")?;
    println!(
        "Redfish enabled={} active={} max={}",
        redfish.enabled, redfish.active_sessions, redfish.max_sessions
    );

    for cmd in ["/show sol", "/show http", "/bios/show"] {
        println!("> {cmd}");
        let response = session
            .send_command(cmd)
            .await
            .with_context(|| format!("'{cmd}' failed"))?;
        print!("{response}");
    }

    if let Some(creds) = serial_login {
        let (login_user, login_pass) = creds
            .split_once(':')
            .context("expected --serial-login user:pass")?;

        let mut console = session
            .open_console()
            .await
            .context("failed to open host console")?;
        println!("Connected to host console, attempting login as '{login_user}'");
        console.send("\n\n")?;

        let mut shell = Shell::login(console, login_user, login_pass)
            .await
            .context("failed to login")?;

        let ret = shell.run("acs debug-token").await?;
        if ret.rc != 0 {
            bail!("failed to run command:{ret}");
        }

        shell.logout().await.context("failed to logout")?;
        session
            .close_console()
            .await
            .context("failed to exit host console")?;
    }

    session.close().context("failed to close session")?;
    println!("All done");

    Ok(())
}

/// Split a `user:pass@host` target.
fn parse_target(target: &str) -> Result<(&str, &str, &str)> {
    let (creds, host) = target
        .split_once('@')
        .context("expected target as user:pass@host")?;
    let (user, pass) = creds
        .split_once(':')
        .context("expected target as user:pass@host")?;
    Ok((user, pass, host))
}
