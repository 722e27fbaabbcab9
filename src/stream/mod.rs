//! Byte-stream framing shared by the server, the client and the backends.

pub mod delimited;
pub mod frame_codec;

pub use delimited::DelimitedBuffer;
pub use frame_codec::{Frame, FrameCodec, FrameDecoder, WireMode};

use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, BoxStream, Stream, StreamExt};

/// Incremental decoder fed with raw reads.
pub trait StreamDecoder: Send {
    /// Decoded item type.
    type Item: Send;

    /// Decode every item completed by `bytes`, keeping the rest buffered.
    fn decode(&mut self, bytes: &[u8]) -> Vec<Self::Item>;

    /// Flush buffered bytes once the input has ended.
    fn finish(&mut self) -> Vec<Self::Item>;
}

struct DecodeState<S, D: StreamDecoder> {
    body: Pin<Box<S>>,
    decoder: D,
    ready: VecDeque<D::Item>,
    exhausted: bool,
}

/// Lazily run a byte stream through `decoder`.
///
/// Items come out in arrival order. A transport error is yielded once and
/// ends the stream; a clean end flushes the decoder first.
pub fn decode_stream<S, B, E, D>(body: S, decoder: D) -> BoxStream<'static, Result<D::Item, E>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Send + 'static,
    D: StreamDecoder + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder,
        ready: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((Ok(item), state));
            }
            if state.exhausted {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let items = state.decoder.decode(bytes.as_ref());
                    state.ready.extend(items);
                }
                Some(Err(err)) => {
                    state.exhausted = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.exhausted = true;
                    let items = state.decoder.finish();
                    state.ready.extend(items);
                }
            }
        }
    })
    .boxed()
}
