//! Streaming commands: chat turns and scoring

use crate::signal_handler::SignalHandler;
use futures::StreamExt;
use medisage_core::error::RelayResult;
use medisage_core::{ChatRequest, RelayContext, ScoreRequest, StreamSession};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Stream one chat turn to stdout
pub async fn chat(ctx: RelayContext, request: ChatRequest) -> RelayResult<()> {
    let session = StreamSession::open_chat(ctx, request).await?;
    relay(session).await
}

/// Stream the grading of a conversation to stdout
pub async fn score(ctx: RelayContext, request: ScoreRequest) -> RelayResult<()> {
    let session = StreamSession::open_score(ctx, request).await?;
    if let Some(score_id) = session.score_id() {
        info!(%score_id, "scoring started");
    }
    relay(session).await
}

async fn relay(session: StreamSession) -> RelayResult<()> {
    let cancel = CancellationToken::new();
    let signals = SignalHandler::start(cancel.clone())?;
    let frames = session.spawn(cancel.clone());

    let result = write_frames(frames, &mut tokio::io::stdout()).await;
    if result.is_err() {
        // Stop the session when stdout goes away
        cancel.cancel();
    }
    signals.stop().await;

    if cancel.is_cancelled() {
        info!("session cancelled");
    }
    result
}

/// Write each frame in its wire encoding, flushing after every frame
async fn write_frames<S, W>(mut frames: S, out: &mut W) -> RelayResult<()>
where
    S: futures::Stream<Item = medisage_core::DownstreamFrame> + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.next().await {
        out.write_all(frame.encode().as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use medisage_core::DownstreamEvent;
    use medisage_core::relay::decode_frames;

    #[tokio::test]
    async fn test_write_frames_uses_wire_encoding() {
        let frames = vec![
            DownstreamEvent::delta("你好").into(),
            DownstreamEvent::chat_done(None, "m1").into(),
            medisage_core::DownstreamFrame::End,
        ];
        let mut out: Vec<u8> = Vec::new();

        write_frames(futures::stream::iter(frames.clone()), &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("data: [DONE]\n\n"));
        assert_eq!(decode_frames(&text), frames);
    }
}
