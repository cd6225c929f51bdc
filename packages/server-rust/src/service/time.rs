//! One-shot time service.

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;

use super::{Service, Session};

/// Writes `Time--> <RFC 2822 UTC time>` and closes the connection.
#[derive(Debug, Default)]
pub struct TimeService;

#[async_trait]
impl Service for TimeService {
    fn name(&self) -> &'static str {
        "time"
    }

    async fn serve(&self, mut session: Session) -> anyhow::Result<()> {
        let reply = format!("Time--> {}\n", Utc::now().to_rfc2822());
        session.stream.write_all(reply.as_bytes()).await?;
        session.stream.shutdown().await?;
        Ok(())
    }
}
