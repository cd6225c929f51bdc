//! Line echo service.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};

use super::{shutdown_requested, Service, Session};

/// Sent before the echo service hangs up.
pub const FAREWELL: &str = "Terminating echo service";

/// Echoes every line back as `echo-> <line>` until a line containing `QUIT`.
#[derive(Debug, Default)]
pub struct EchoService;

#[async_trait]
impl Service for EchoService {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn serve(&self, session: Session) -> anyhow::Result<()> {
        let (mut lines, mut shutdown) = session.into_lines();

        loop {
            let line = tokio::select! {
                line = lines.next() => line,
                () = shutdown_requested(&mut shutdown) => break,
            };
            let Some(line) = line else { break };
            // Invalid UTF-8 is echoed back lossily decoded.
            let line = line?
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());

            if line.to_ascii_uppercase().contains("QUIT") {
                lines.send(FAREWELL).await?;
                break;
            }
            lines.send(format!("echo-> {line}")).await?;
        }

        Ok(())
    }
}
