//! Line-oriented command channel.

use p2pminer_core::Command;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reads one command per line from `input` into `commands` until the input
/// ends or `cancel` fires. Blank lines are ignored.
///
/// End of input only stops the reader; the node keeps running.
pub async fn read_commands<R>(input: R, commands: mpsc::UnboundedSender<Command>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                let Some(command) = Command::parse(&line) else {
                    continue;
                };
                debug!(%command, "command queued");
                if commands.send(command).is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("Control input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read control input");
                break;
            }
        }
    }
}
