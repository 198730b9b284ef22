//! Process runner
//!
//! Spawns a child process, pumps its stdout and stderr into a
//! [`ConsoleService`] from one reader thread per stream, and binds the
//! child's stdin as the service's input target while it runs.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::service::{BindingId, ConsoleService, StdinBinding, StdinConsumer};
use super::term::StreamKind;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for process: {0}")]
    Io(#[from] io::Error),
}

/// Size of one read from a child pipe
const READ_CHUNK: usize = 4096;

/// A running child process attached to a console
pub struct ProcessRunner {
    child: Child,
    program: String,
    service: ConsoleService,
    /// Reader thread handles
    readers: Vec<JoinHandle<()>>,
    /// Keeps the child's stdin bound while it runs
    binding: Option<StdinBinding>,
    finished: bool,
}

impl ProcessRunner {
    /// Start `program` with piped stdio
    pub fn spawn(service: &ConsoleService, program: &str, args: &[String]) -> Result<Self, RunnerError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(service.clone(), stdout, StreamKind::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(service.clone(), stderr, StreamKind::Stderr));
        }

        let binding = child.stdin.take().map(|stdin| {
            let stdin = Mutex::new(stdin);
            let consumer: StdinConsumer = Arc::new(move |text: &str| {
                let mut stdin = stdin.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = stdin.write_all(text.as_bytes()).and_then(|()| stdin.flush()) {
                    warn!("Failed to write to process stdin: {}", e);
                }
            });
            service.bind_stdin(consumer)
        });

        info!("Started {} (pid {})", program, child.id());

        Ok(Self {
            child,
            program: program.to_string(),
            service: service.clone(),
            readers,
            binding,
            finished: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Id of this process's stdin binding. Releasing it through
    /// [`ConsoleService::release_stdin`] closes the child's stdin.
    pub fn stdin_binding(&self) -> Option<BindingId> {
        self.binding.as_ref().map(StdinBinding::id)
    }

    /// Wait for exit, drain both streams, release stdin and report the status
    pub fn wait(mut self) -> Result<ExitStatus, RunnerError> {
        let status = self.child.wait()?;
        self.finished = true;

        for reader in self.readers.drain(..) {
            if reader.join().is_err() {
                error!("Reader thread for {} panicked", self.program);
            }
        }
        drop(self.binding.take());

        info!("{} exited with {}", self.program, status);
        let prefix = if self.service.cursor().1 > 0 { "\r\n" } else { "" };
        self.service.write(
            &format!("{}[{} exited with {}]\n", prefix, self.program, status),
            StreamKind::System,
        );
        Ok(status)
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.child.kill() {
                debug!("Kill {} failed: {}", self.program, e);
            }
        }
    }
}

/// Pump one pipe into the console until EOF
fn spawn_reader<R>(service: ConsoleService, mut source: R, stream: StreamKind) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = vec![0u8; READ_CHUNK];
        let mut decoder = Utf8Decoder::default();

        loop {
            match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    let text = decoder.decode(&buffer[..n]);
                    if !text.is_empty() {
                        service.write(&text, stream);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Pipe closed or process gone
                    debug!("{:?} reader stopped: {}", stream, e);
                    break;
                }
            }
        }

        let rest = decoder.finish();
        if !rest.is_empty() {
            service.write(&rest, stream);
        }
    })
}

/// Incremental UTF-8 decoder
///
/// Holds back an incomplete multi-byte sequence at the end of a chunk until
/// the next one arrives. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(bytes);

        let mut out = String::with_capacity(data.len());
        let mut input: &[u8] = &data;
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&input[..valid_up_to]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &input[valid_up_to + len..];
                        }
                        None => {
                            // Incomplete sequence at the end
                            self.pending = input[valid_up_to..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is still held back
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}
