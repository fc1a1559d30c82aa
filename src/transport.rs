//! Platform-variant local IPC, abstracted behind one pair of traits so the
//! rest of the crate never branches on `cfg(unix)` / `cfg(windows)` itself.

use std::io::{self, Read, Write};

pub trait Channel: Read + Write + Send {}
impl<T: Read + Write + Send> Channel for T {}

pub trait Listener: Send {
    type Conn: Channel + 'static;

    fn bind(addr: &str) -> io::Result<Self>
    where
        Self: Sized;

    /// Accept one connection, or return `Ok(None)` if none arrived within
    /// the listener's internal poll timeout (used so the accept loop can
    /// observe the shutdown flag between connections).
    fn accept(&self) -> io::Result<Option<Self::Conn>>;
}

/// Open an outbound connection to `addr` for one-shot callback delivery.
pub fn connect(addr: &str) -> io::Result<impl Channel> {
    platform::connect(addr)
}

#[cfg(unix)]
mod platform {
    use super::*;
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::time::Duration;

    pub struct UnixSocketListener {
        inner: UnixListener,
    }

    impl Listener for UnixSocketListener {
        type Conn = UnixStream;

        fn bind(addr: &str) -> io::Result<Self> {
            let _ = std::fs::remove_file(addr);
            let inner = UnixListener::bind(addr)?;
            // Non-blocking so the accept loop can poll the shutdown flag
            // between connection attempts instead of blocking forever.
            inner.set_nonblocking(true)?;
            Ok(Self { inner })
        }

        fn accept(&self) -> io::Result<Option<Self::Conn>> {
            match self.inner.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    Ok(Some(stream))
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(50));
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }
    }

    pub fn connect(addr: &str) -> io::Result<UnixStream> {
        let stream = UnixStream::connect(addr)?;
        stream.set_write_timeout(Some(Duration::from_secs(5)))?;
        Ok(stream)
    }
}

#[cfg(unix)]
pub use platform::UnixSocketListener as DefaultListener;

#[cfg(windows)]
mod platform {
    use super::*;
    use std::fs::OpenOptions;
    use std::os::windows::fs::OpenOptionsExt;
    use windows_sys::Win32::Storage::FileSystem::{
        CreateNamedPipeA, PIPE_ACCESS_DUPLEX,
    };
    use windows_sys::Win32::System::Pipes::{
        ConnectNamedPipe, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE, PIPE_UNLIMITED_INSTANCES,
        PIPE_WAIT,
    };
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
    use std::os::windows::io::FromRawHandle;
    use std::fs::File;

    /// A minimal named-pipe server: one instance per accepted connection,
    /// recreated after each accept (one request per connection, rather
    /// than a long-lived duplex session).
    pub struct NamedPipeListener {
        name: String,
    }

    pub struct NamedPipeStream {
        file: File,
    }

    impl std::io::Read for NamedPipeStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.file.read(buf)
        }
    }
    impl std::io::Write for NamedPipeStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.file.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl Listener for NamedPipeListener {
        type Conn = NamedPipeStream;

        fn bind(addr: &str) -> io::Result<Self> {
            Ok(Self { name: addr.to_string() })
        }

        fn accept(&self) -> io::Result<Option<Self::Conn>> {
            let full = format!("\\\\.\\pipe\\{}\0", self.name);
            let handle: HANDLE = unsafe {
                CreateNamedPipeA(
                    full.as_ptr(),
                    PIPE_ACCESS_DUPLEX,
                    PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
                    PIPE_UNLIMITED_INSTANCES,
                    8192,
                    8192,
                    0,
                    std::ptr::null_mut(),
                )
            };
            if handle == INVALID_HANDLE_VALUE {
                return Err(io::Error::last_os_error());
            }
            let connected = unsafe { ConnectNamedPipe(handle, std::ptr::null_mut()) };
            if connected == 0 {
                unsafe { CloseHandle(handle) };
                return Err(io::Error::last_os_error());
            }
            let file = unsafe { File::from_raw_handle(handle as *mut _) };
            Ok(Some(NamedPipeStream { file }))
        }
    }

    pub fn connect(addr: &str) -> io::Result<NamedPipeStream> {
        let full = format!("\\\\.\\pipe\\{addr}");
        let file = OpenOptions::new().read(true).write(true).open(full)?;
        Ok(NamedPipeStream { file })
    }
}

#[cfg(windows)]
pub use platform::NamedPipeListener as DefaultListener;

pub const DEFAULT_UNIX_SOCKET_PATH: &str = "/tmp/granville.sock";
pub const DEFAULT_NAMED_PIPE_NAME: &str = "granville";
