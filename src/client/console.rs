//! Operator-facing console output and the Enter-to-close gate.

use std::io::{self, BufRead, Write};

use tokio::sync::oneshot;
use tracing::debug;

pub const SEPARATOR: &str = "========================================";
pub const CLOSE_PROMPT: &str = "Press Enter to close public access...";
pub const CLOSED_MESSAGE: &str = "Public access closed";

/// Banner announcing the public URL
pub fn render_banner(app_name: &str, public_url: &str) -> String {
    let mut out = String::new();
    out.push_str("\n\n");
    out.push_str(SEPARATOR);
    out.push('\n');
    out.push_str(&format!("{} public URL:\n", app_name));
    out.push_str(public_url);
    out.push('\n');
    out.push_str(SEPARATOR);
    out.push_str("\n\n\n");
    out.push_str("Open the address above in a browser on your phone to use the application\n");
    out.push_str("Note: this address stops working once this program exits\n");
    out.push_str("\n\n");
    out
}

/// Print `prompt` and block until a line (or EOF) arrives on `input`.
pub fn wait_for_enter<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    prompt: &str,
) -> io::Result<()> {
    write!(output, "{}", prompt)?;
    output.flush()?;

    let mut line = String::new();
    let read = input.read_line(&mut line)?;
    if read == 0 {
        debug!("stdin closed, treating as close signal");
    }
    Ok(())
}

/// Wait for the operator to press Enter on stdin.
///
/// The read blocks a dedicated OS thread rather than a runtime worker, so the
/// caller can race it against other events and exit without waiting for it.
pub async fn await_operator_signal(prompt: &str) -> io::Result<()> {
    let (tx, rx) = oneshot::channel();
    let prompt = prompt.to_string();

    std::thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            let result = wait_for_enter(stdin.lock(), io::stdout(), &prompt);
            let _ = tx.send(result);
        })?;

    rx.await
        .unwrap_or_else(|_| Err(io::Error::other("operator input thread ended")))
}
