//! Progress frames as server-sent events.
//!
//! One SSE event per frame; the SSE event name is the frame's `type`.
//! Dropping the response body drops the receiver, which the engine treats
//! as a client disconnect.

use axum::response::sse::{Event, KeepAlive, Sse};
use chronoweave_simulation::application::stream::ProgressReceiver;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

/// Streams `progress` until the run closes it.
pub fn progress_stream(
    progress: ProgressReceiver,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let frames = ReceiverStream::new(progress)
        .map(|frame| Event::default().event(frame.kind()).json_data(&frame));

    Sse::new(frames).keep_alive(KeepAlive::default())
}
