// Playback subsystem: queue, history, prefetch, the request-token
// engine, and the async session that drives it.

pub mod audio;
pub mod engine;
pub mod events;
pub mod history;
pub mod prefetch;
pub mod queue;
pub mod session;
