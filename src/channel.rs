//! Line-oriented exchange with a long-lived external simulator process.
//!
//! One request line of decision variables goes to the child's stdin, one
//! response line of objectives followed by constraints comes back on its
//! stdout. There is no framing beyond the newline and no request id, so
//! exchanges are strictly sequential, any output outside an exchange is a
//! failure, and the first failure poisons the channel for the rest of its
//! life.

use crate::error::{CalibrationError, ProtocolError};
use crate::evaluator::Simulator;
use log::{debug, trace, warn};
use std::ffi::OsStr;
use std::fmt::Write as _;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// How long a simulator gets to exit on its own once stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct ProcessChannel {
    program: String,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    lines: Receiver<io::Result<String>>,
    arity: usize,
    timeout: Option<Duration>,
    poisoned: bool,
    closed: bool,
    exchanges: u64,
}

impl ProcessChannel {
    /// Spawn `program` with `args`, keeping stdin and stdout piped for the
    /// lifetime of the channel. Stderr is inherited so simulator diagnostics
    /// reach the terminal. Every response line must carry exactly `arity`
    /// values.
    pub fn spawn<I, S>(program: &str, args: I, arity: usize) -> Result<Self, CalibrationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let spawn_err = |source: io::Error| ProtocolError::Spawn {
            program: program.to_string(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_err)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(i), Some(o)) => (i, o),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(spawn_err(io::Error::other("standard streams were not captured")).into());
            }
        };

        // Single reader; the channel owner stays the single writer.
        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name("simulator-stdout".to_string())
            .spawn(move || {
                let mut out = BufReader::new(stdout);
                loop {
                    let mut line = String::new();
                    match out.read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) => {
                            if tx.send(Ok(line)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e));
                            break;
                        }
                    }
                }
            });
        if let Err(e) = reader {
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_err(e).into());
        }

        debug!("spawned simulator `{}` (pid {})", program, child.id());

        Ok(Self {
            program: program.to_string(),
            child,
            stdin: Some(BufWriter::new(stdin)),
            lines: rx,
            arity,
            timeout: None,
            poisoned: false,
            closed: false,
            exchanges: 0,
        })
    }

    /// Fail an exchange with `ProtocolError::Timeout` when no response line
    /// arrives within `limit`.
    ///
    /// Only the wait for the answer is bounded. Writing the request blocks
    /// without a deadline if the simulator stops reading its stdin and the
    /// pipe buffer fills up.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Completed request/response pairs.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Send `x` and return the answer's values, objectives first.
    pub fn evaluate(&mut self, x: &[f64]) -> Result<Vec<f64>, CalibrationError> {
        if self.poisoned || self.closed {
            return Err(ProtocolError::Poisoned.into());
        }
        match self.exchange(x) {
            Ok(values) => {
                self.exchanges += 1;
                Ok(values)
            }
            Err(e) => {
                self.poisoned = true;
                Err(e.into())
            }
        }
    }

    fn exchange(&mut self, x: &[f64]) -> Result<Vec<f64>, ProtocolError> {
        self.ensure_idle()?;
        let request = format_request(x);
        trace!(">> {}", request.trim_end());

        let stdin = self.stdin.as_mut().ok_or(ProtocolError::Poisoned)?;
        stdin
            .write_all(request.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(ProtocolError::Write)?;

        let line = self.receive()?;
        trace!("<< {}", line.trim_end());
        parse_response(&line, self.arity)
    }

    /// Nothing may be queued between exchanges. A line that is already
    /// waiting would be taken as the answer to the next request.
    fn ensure_idle(&self) -> Result<(), ProtocolError> {
        match self.lines.try_recv() {
            Ok(Ok(line)) => Err(ProtocolError::Unsolicited {
                line: line.trim_end().to_string(),
            }),
            Ok(Err(e)) => Err(ProtocolError::Read(e)),
            Err(TryRecvError::Empty) => Ok(()),
            Err(TryRecvError::Disconnected) => Err(ProtocolError::Exited),
        }
    }

    fn receive(&self) -> Result<String, ProtocolError> {
        let received = match self.timeout {
            Some(limit) => match self.lines.recv_timeout(limit) {
                Ok(r) => r,
                Err(RecvTimeoutError::Timeout) => return Err(ProtocolError::Timeout(limit)),
                Err(RecvTimeoutError::Disconnected) => return Err(ProtocolError::Exited),
            },
            None => self.lines.recv().map_err(|_| ProtocolError::Exited)?,
        };
        let line = received.map_err(ProtocolError::Read)?;
        // A line cut short by end of stream is a dead simulator, not an answer.
        if !line.ends_with('\n') {
            return Err(ProtocolError::Exited);
        }
        Ok(line)
    }

    /// Close stdin, let the simulator finish, and reap it. Kills the process
    /// if it does not exit within the grace period or the channel is poisoned.
    pub fn close(mut self) -> Option<ExitStatus> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<ExitStatus> {
        if self.closed {
            return None;
        }
        self.closed = true;
        self.stdin.take();

        if self.poisoned {
            debug!("terminating simulator `{}` after protocol failure", self.program);
            return self.kill();
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(
                        "simulator `{}` exited with {} after {} evaluations",
                        self.program, status, self.exchanges
                    );
                    return Some(status);
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                Ok(None) => {
                    warn!(
                        "simulator `{}` still running {:?} after end of input, killing it",
                        self.program, SHUTDOWN_GRACE
                    );
                    return self.kill();
                }
                Err(e) => {
                    warn!("could not poll simulator `{}`: {}", self.program, e);
                    return self.kill();
                }
            }
        }
    }

    fn kill(&mut self) -> Option<ExitStatus> {
        let _ = self.child.kill();
        self.child.wait().ok()
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Simulator for ProcessChannel {
    fn evaluate(&mut self, x: &[f64]) -> Result<Vec<f64>, CalibrationError> {
        ProcessChannel::evaluate(self, x)
    }
}

/// `v0 v1 ... v_{n-1}\n` using the shortest representation that parses back
/// to the same f64.
pub fn format_request(x: &[f64]) -> String {
    let mut line = String::with_capacity(x.len() * 20);
    for (i, v) in x.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        let _ = write!(line, "{}", v);
    }
    line.push('\n');
    line
}

/// Parse one response line of exactly `expected` finite numbers.
pub fn parse_response(line: &str, expected: usize) -> Result<Vec<f64>, ProtocolError> {
    let raw = line.trim_end_matches(&['\r', '\n'][..]);
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() != expected {
        return Err(ProtocolError::Arity {
            expected,
            found: tokens.len(),
            line: raw.to_string(),
        });
    }

    let mut values = Vec::with_capacity(expected);
    for (position, token) in tokens.iter().enumerate() {
        match token.parse::<f64>() {
            Ok(v) if v.is_finite() => values.push(v),
            _ => {
                return Err(ProtocolError::InvalidNumber {
                    position,
                    token: token.to_string(),
                    line: raw.to_string(),
                })
            }
        }
    }

    Ok(values)
}
