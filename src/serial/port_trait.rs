//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use std::io;

/// Trait for serial port I/O operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Read whatever is currently available into `buf`
    ///
    /// Returns `Ok(0)` when nothing is waiting. Never blocks longer than the
    /// port's read timeout.
    async fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;
}

#[async_trait]
impl<P: SerialPortIO + ?Sized> SerialPortIO for Box<P> {
    async fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_available(buf).await
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        (**self).flush().await
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock serial port for testing
    #[derive(Clone, Default)]
    pub struct MockSerialPort {
        pub incoming: Arc<Mutex<VecDeque<Vec<u8>>>>,
        pub written_data: Arc<Mutex<Vec<Vec<u8>>>>,
        pub read_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub write_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub flush_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub read_delay: Arc<Mutex<Option<Duration>>>,
        pub reads: Arc<Mutex<usize>>,
    }

    impl MockSerialPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue bytes for a later `read_available`
        pub fn push_incoming(&self, data: impl Into<Vec<u8>>) {
            self.incoming.lock().unwrap().push_back(data.into());
        }

        pub fn get_written_data(&self) -> Vec<Vec<u8>> {
            self.written_data.lock().unwrap().clone()
        }

        pub fn read_count(&self) -> usize {
            *self.reads.lock().unwrap()
        }

        pub fn set_read_error(&self, error: io::ErrorKind) {
            *self.read_error.lock().unwrap() = Some(error);
        }

        pub fn set_write_error(&self, error: io::ErrorKind) {
            *self.write_error.lock().unwrap() = Some(error);
        }

        pub fn set_flush_error(&self, error: io::ErrorKind) {
            *self.flush_error.lock().unwrap() = Some(error);
        }

        pub fn set_read_delay(&self, delay: Duration) {
            *self.read_delay.lock().unwrap() = Some(delay);
        }
    }

    #[async_trait]
    impl SerialPortIO for MockSerialPort {
        async fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            *self.reads.lock().unwrap() += 1;

            let delay = *self.read_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(error) = *self.read_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock read error"));
            }

            let mut incoming = self.incoming.lock().unwrap();
            let Some(mut chunk) = incoming.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                incoming.push_front(chunk.split_off(n));
            }
            Ok(n)
        }

        async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            if let Some(error) = *self.write_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock write error"));
            }
            self.written_data.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        async fn flush(&mut self) -> io::Result<()> {
            if let Some(error) = *self.flush_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock flush error"));
            }
            Ok(())
        }
    }
}
