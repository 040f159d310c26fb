//! Interactive terminal endpoint

use std::io::Write;

use async_trait::async_trait;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use ac_core::error::EndpointError;
use ac_core::traits::Endpoint;

/// Prints to stdout and reads lines from stdin.
///
/// Stdin is drained by a background task into a queue so `receive` can be
/// dropped mid-wait without losing a line. Only one console endpoint should
/// read stdin at a time.
pub struct ConsoleEndpoint {
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
    reader: JoinHandle<()>,
}

impl ConsoleEndpoint {
    /// Console reading from stdin
    pub fn new() -> Self {
        Self::from_reader(tokio::io::stdin())
    }

    /// Console reading lines from `input` instead of stdin
    pub fn from_reader<R>(input: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(input).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Failed to read console input: {}", e);
                        break;
                    }
                }
            }
        });

        Self {
            lines: Mutex::new(rx),
            reader,
        }
    }

    fn print(color: Color, label: &str, text: &str) -> Result<(), EndpointError> {
        let mut stdout = std::io::stdout();
        crossterm::execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(color),
            Print(label),
            ResetColor,
            Print(text),
            Print("\n")
        )?;
        Ok(())
    }
}

impl Default for ConsoleEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Endpoint for ConsoleEndpoint {
    async fn send_message(&self, sender: &str, text: &str) -> Result<(), EndpointError> {
        Self::print(Color::Cyan, &format!("[{}] ", sender), text)
    }

    async fn send_status(&self, text: &str) -> Result<(), EndpointError> {
        let mut stdout = std::io::stdout();
        crossterm::execute!(
            stdout,
            SetForegroundColor(Color::Yellow),
            Print(format!("[Status] {}\n", text)),
            ResetColor
        )?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<String>, EndpointError> {
        let mut lines = self.lines.lock().await;
        {
            let mut stdout = std::io::stdout();
            crossterm::execute!(
                stdout,
                SetForegroundColor(Color::Green),
                Print("[You] > "),
                ResetColor
            )?;
            stdout.flush()?;
        }
        Ok(lines.recv().await)
    }

    async fn send_completion(&self, summary: &str) -> Result<(), EndpointError> {
        let mut stdout = std::io::stdout();
        crossterm::execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Color::Magenta),
            Print("========== TASK COMPLETE ==========\n"),
            ResetColor,
            Print(format!("{}\n", summary)),
            SetForegroundColor(Color::Magenta),
            Print("===================================\n"),
            ResetColor
        )?;
        Ok(())
    }

    async fn release(&self) -> Result<(), EndpointError> {
        self.reader.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_lines_until_end_of_input() {
        let console = ConsoleEndpoint::from_reader(&b"status\nstop\n"[..]);
        assert_eq!(console.receive().await.unwrap().as_deref(), Some("status"));
        assert_eq!(console.receive().await.unwrap().as_deref(), Some("stop"));
        assert_eq!(console.receive().await.unwrap(), None);
        console.release().await.unwrap();
    }
}
