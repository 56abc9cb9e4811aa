// State-change notifications emitted by the playback engine.
// The UI drains these from an unbounded channel in its draw loop and
// re-renders whatever the event invalidates.

use crate::track::Track;

#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Queue contents or cursor changed.
    QueueChanged,
    /// A different track became current (or playback stopped).
    TrackChanged(Option<Track>),
    /// The up-next suggestion buffer was replaced.
    UpNextChanged,
    /// A play request is (or is no longer) waiting on stream resolution.
    Loading(bool),
    /// Resolving the stream for an explicitly requested track failed.
    /// Playback state is unchanged.
    PlayFailed { title: String, reason: String },
    /// Both the queue and the up-next buffer are exhausted. Distinct from
    /// a pause so the UI can say so.
    QueueEnded,
}
