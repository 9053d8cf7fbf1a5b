use std::io::{self, BufRead, Stderr, StdinLock, Write};
use std::sync::Mutex;

use pushcloud_core::{CopyError, Prompter};

/// Line-based prompts on a terminal (stdin/stderr by default).
pub struct TerminalPrompter<R, W> {
    input: Mutex<R>,
    output: Mutex<W>,
}

impl TerminalPrompter<StdinLock<'static>, Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn prompt_line(&self, prompt: &str) -> io::Result<String> {
        {
            let mut output = self
                .output
                .lock()
                .map_err(|_| io::Error::other("prompt output poisoned"))?;
            output.write_all(prompt.as_bytes())?;
            output.flush()?;
        }
        let mut input = self
            .input
            .lock()
            .map_err(|_| io::Error::other("prompt input poisoned"))?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "console closed before an answer was given",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

pub fn read_password(username: &str) -> io::Result<String> {
    rpassword::prompt_password(format!("Password for {username}: "))
}

/// One-line failure report, prefixed with the protocol stage when known.
pub fn failure_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<CopyError>().and_then(CopyError::stage) {
        Some(stage) => format!("{stage} failed: {err:#}"),
        None => format!("{err:#}"),
    }
}
