//! NETCONF 1.0 session over an `ssh -s netconf` subprocess.
use std::fmt;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::drivers::error::BackendError;
use crate::drivers::registry::DriverTarget;

/// End-of-message marker of base 1.0 framing.
pub(super) const DELIMITER: &str = "]]>]]>";

/// NETCONF over SSH port.
const NETCONF_PORT: u16 = 830;

const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// How to launch the transport.
#[derive(Debug, Clone)]
pub(super) struct Transport {
    program: PathBuf,
    args: Vec<String>,
    password: Option<String>,
}

impl Transport {
    /// Build the `ssh` invocation for `target`, wrapped in `sshpass` when a
    /// password is supplied.
    pub(super) fn for_target(target: &DriverTarget) -> Result<Self, BackendError> {
        let ssh = which::which("ssh")
            .map_err(|_| BackendError::Protocol("ssh client not found on PATH".to_string()))?;

        let mut args = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", target.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=2".to_string(),
            "-p".to_string(),
            NETCONF_PORT.to_string(),
        ];
        if target.password.is_none() {
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }
        if let Some(key) = &target.ssh_key {
            args.extend(["-i".to_string(), key.display().to_string()]);
        }
        if let Some(user) = &target.username {
            args.extend(["-l".to_string(), user.clone()]);
        }
        args.extend([
            target.address.to_string(),
            "-s".to_string(),
            "netconf".to_string(),
        ]);

        match &target.password {
            None => Ok(Self {
                program: ssh,
                args,
                password: None,
            }),
            Some(password) => {
                let sshpass = which::which("sshpass").map_err(|_| {
                    BackendError::Auth("password login needs sshpass on PATH".to_string())
                })?;
                let mut wrapped = vec!["-e".to_string(), ssh.display().to_string()];
                wrapped.extend(args);
                Ok(Self {
                    program: sshpass,
                    args: wrapped,
                    password: Some(password.clone()),
                })
            }
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(password) = &self.password {
            cmd.env("SSHPASS", password);
        }
        cmd
    }
}

/// Split a byte stream into NETCONF messages.
#[derive(Debug, Default)]
pub(super) struct Framer {
    buffer: Vec<u8>,
}

impl Framer {
    /// Append bytes and return every message completed by them.
    pub(super) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let delimiter = DELIMITER.as_bytes();
        let mut messages = Vec::new();
        while let Some(end) = self
            .buffer
            .windows(delimiter.len())
            .position(|w| w == delimiter)
        {
            let rest = self.buffer.split_off(end + delimiter.len());
            let mut message = std::mem::replace(&mut self.buffer, rest);
            message.truncate(end);
            messages.push(String::from_utf8_lossy(&message).trim().to_string());
        }
        messages
    }
}

/// Map what `ssh` printed on stderr to an error kind.
pub(super) fn classify_stderr(stderr: &str) -> BackendError {
    let text = stderr.trim();
    let lower = text.to_lowercase();
    let reason = if text.is_empty() {
        "session closed by peer".to_string()
    } else {
        text.to_string()
    };
    if lower.contains("permission denied") || lower.contains("authentication") {
        BackendError::Auth(reason)
    } else if lower.contains("timed out") {
        BackendError::Timeout(reason)
    } else if lower.contains("no route to host")
        || lower.contains("could not resolve")
        || lower.contains("connection refused")
        || lower.contains("network is unreachable")
        || lower.contains("connection closed")
    {
        BackendError::Unreachable(reason)
    } else {
        BackendError::Protocol(reason)
    }
}

/// A live NETCONF session.
pub(super) struct Session {
    child: Child,
    stdin: ChildStdin,
    messages: Receiver<String>,
    stderr: Arc<Mutex<String>>,
    next_id: u64,
    rpc_timeout: Duration,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("pid", &self.child.id())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Spawn the transport and exchange hellos.
    pub(super) fn open(
        transport: &Transport,
        connect_timeout: Duration,
        rpc_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut child = transport.command().spawn()?;
        let (Some(stdin), Some(stdout), Some(stderr_pipe)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            return Err(BackendError::Protocol("transport pipes unavailable".to_string()));
        };

        let (tx, messages) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut framer = Framer::default();
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        for message in framer.push(buf.get(..n).unwrap_or_default()) {
                            if tx.send(message).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        let stderr = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&stderr);
        thread::spawn(move || {
            let mut text = String::new();
            let _ = BufReader::new(stderr_pipe).read_to_string(&mut text);
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_str(&text);
        });

        let mut session = Self {
            child,
            stdin,
            messages,
            stderr,
            next_id: 0,
            rpc_timeout,
        };
        session.send(&format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><hello xmlns="{BASE_NS}"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>"#
        ))?;
        let hello = session.receive(connect_timeout + Duration::from_secs(5))?;
        if !hello.contains("<hello") {
            return Err(BackendError::Protocol(
                "server did not send a NETCONF hello".to_string(),
            ));
        }
        Ok(session)
    }

    fn send(&mut self, message: &str) -> Result<(), BackendError> {
        self.stdin.write_all(message.as_bytes())?;
        self.stdin.write_all(DELIMITER.as_bytes())?;
        self.stdin.flush()?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<String, BackendError> {
        match self.messages.recv_timeout(timeout) {
            Ok(message) => Ok(message),
            Err(RecvTimeoutError::Timeout) => Err(BackendError::Timeout(format!(
                "no reply within {}s",
                timeout.as_secs()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                // Let the stderr reader drain before classifying.
                let _ = self.child.wait();
                thread::sleep(Duration::from_millis(50));
                let stderr = self
                    .stderr
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                Err(classify_stderr(&stderr))
            }
        }
    }

    /// Send one RPC and return the raw reply.
    pub(super) fn rpc(&mut self, body: &str) -> Result<String, BackendError> {
        self.next_id += 1;
        let message = format!(
            r#"<rpc message-id="{}" xmlns="{BASE_NS}">{body}</rpc>"#,
            self.next_id
        );
        self.send(&message)?;
        self.receive(self.rpc_timeout)
    }

    /// Close the session politely, then make sure the transport is gone.
    pub(super) fn close(mut self) -> Result<(), BackendError> {
        let result = self.rpc("<close-session/>").map(|_| ());
        let _ = self.child.kill();
        let _ = self.child.wait();
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}
