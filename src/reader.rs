use std::io::Read;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

/// Spawns the dedicated reader thread for a duplex stream.
///
/// The blocking reads live on this thread for the whole life of the stream so
/// that pattern waits can be preempted by a deadline without ever leaving two
/// readers racing on the same stream. The thread exits on EOF, on a read
/// error, or once the receiving side is dropped.
pub(crate) fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx): (Sender<Vec<u8>>, Receiver<Vec<u8>>) = channel();

    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break, // EOF
                Ok(n) => {
                    if tx.send(buffer[..n].to_vec()).is_err() {
                        break; // receiver dropped
                    }
                }
                Err(_) => break,
            }
        }
    });

    rx
}
