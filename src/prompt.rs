use std::future::Future;
use std::time::Duration;

use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tracing::debug;

use crate::error::{OtpError, Result};

/// Line-oriented question/answer channel with the operator
#[derive(Debug)]
pub struct Prompt<R, W> {
    reader: R,
    writer: W,
    timeout: Option<Duration>,
    closed: bool,
}

impl Prompt<BufReader<Stdin>, Stdout> {
    pub fn stdio(timeout: Option<Duration>) -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout(), timeout)
    }
}

impl<R, W> Prompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, timeout: Option<Duration>) -> Self {
        Self {
            reader,
            writer,
            timeout,
            closed: false,
        }
    }

    /// Show `message` and wait for one line. The line terminator is stripped,
    /// nothing else is touched.
    pub async fn ask(&mut self, message: &str) -> Result<String> {
        if self.closed {
            return Err(OtpError::PromptClosed);
        }

        self.writer.write_all(message.as_bytes()).await?;
        self.writer.flush().await?;

        let mut line = String::new();
        let read = self.reader.read_line(&mut line);
        let bytes = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| OtpError::PromptTimeout(limit))??,
            None => read.await?,
        };

        if bytes == 0 {
            return Err(OtpError::PromptClosed);
        }

        let answer = line.trim_end_matches(&['\r', '\n'][..]).to_string();
        debug!("Read {} characters from the prompt", answer.len());
        Ok(answer)
    }

    /// [`Prompt::ask`], abandoned as soon as `cancel` resolves
    pub async fn ask_or_cancel<F>(&mut self, message: &str, cancel: F) -> Result<String>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            answer = self.ask(message) => answer,
            _ = cancel => Err(OtpError::PromptCancelled),
        }
    }

    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.writer.flush().await {
            debug!("Failed to flush prompt output: {}", e);
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[cfg(test)]
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
