//! Change notifications.
//!
//! Events are delivered synchronously on the thread that released the track
//! lock. Handlers may call back into the track.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use parking_lot::{Mutex, RwLock};

use super::metadata::{ReplayGain, RgbColor};
use super::record::TrackId;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    /// The dirty flag flipped from clean to dirty.
    Dirty(TrackId),
    /// The dirty flag flipped from dirty to clean.
    Clean(TrackId),
    /// Sent on every modification of a persisted track.
    Changed(TrackId),
    TitleChanged(String),
    ArtistChanged(String),
    AlbumChanged(String),
    AlbumArtistChanged(String),
    GenreChanged(String),
    ComposerChanged(String),
    GroupingChanged(String),
    YearChanged(String),
    TrackNumberChanged(String),
    TrackTotalChanged(String),
    CommentChanged(String),
    TimesPlayedChanged,
    /// Several descriptive fields may have changed at once.
    InfoChanged,
    /// Tempo and beat grid always change together.
    BeatsUpdated,
    CuesUpdated,
    CoverArtUpdated,
    KeyChanged,
    DurationChanged,
    ReplayGainUpdated(ReplayGain),
    ReplayGainAdjusted(ReplayGain),
    ColorUpdated(Option<RgbColor>),
    WaveformUpdated,
    WaveformSummaryUpdated,
    Analyzed,
}

/// Subscription categories.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    DirtyState,
    Changed,
    Info,
    TimesPlayed,
    Beats,
    Cues,
    CoverArt,
    Key,
    Duration,
    ReplayGain,
    Color,
    Waveform,
    Analyzed,
}

impl TrackEvent {
    pub fn kind(&self) -> EventKind {
        use TrackEvent::*;
        match self {
            Dirty(_) | Clean(_) => EventKind::DirtyState,
            Changed(_) => EventKind::Changed,
            TitleChanged(_)
            | ArtistChanged(_)
            | AlbumChanged(_)
            | AlbumArtistChanged(_)
            | GenreChanged(_)
            | ComposerChanged(_)
            | GroupingChanged(_)
            | YearChanged(_)
            | TrackNumberChanged(_)
            | TrackTotalChanged(_)
            | CommentChanged(_)
            | InfoChanged => EventKind::Info,
            TimesPlayedChanged => EventKind::TimesPlayed,
            BeatsUpdated => EventKind::Beats,
            CuesUpdated => EventKind::Cues,
            CoverArtUpdated => EventKind::CoverArt,
            KeyChanged => EventKind::Key,
            DurationChanged => EventKind::Duration,
            ReplayGainUpdated(_) | ReplayGainAdjusted(_) => EventKind::ReplayGain,
            ColorUpdated(_) => EventKind::Color,
            WaveformUpdated | WaveformSummaryUpdated => EventKind::Waveform,
            Analyzed => EventKind::Analyzed,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&TrackEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    kind: Option<EventKind>,
    handler: Handler,
}

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&TrackEvent) + Send + Sync + 'static,
    {
        self.add(Some(kind), Arc::new(handler))
    }

    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TrackEvent) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(handler))
    }

    /// Receive events through a channel instead of a callback. The
    /// subscription stays active until it is removed, even after the receiver
    /// has been dropped.
    pub fn subscribe_channel(
        &self,
        kind: Option<EventKind>,
    ) -> (SubscriptionId, Receiver<TrackEvent>) {
        let (tx, rx) = mpsc::channel::<TrackEvent>();
        let tx: Mutex<Sender<TrackEvent>> = Mutex::new(tx);
        let id = self.add(
            kind,
            Arc::new(move |event: &TrackEvent| {
                let _ = tx.lock().send(event.clone());
            }),
        );
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn add(&self, kind: Option<EventKind>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber = Subscriber { id, kind, handler };
        self.subscribers.write().push(subscriber);
        id
    }

    /// Deliver events in order. Handlers are snapshotted first so they may
    /// subscribe or unsubscribe while being called.
    pub(crate) fn emit(&self, events: Vec<TrackEvent>) {
        if events.is_empty() {
            return;
        }
        let handlers: Vec<(Option<EventKind>, Handler)> = self
            .subscribers
            .read()
            .iter()
            .map(|s| (s.kind, s.handler.clone()))
            .collect();
        if handlers.is_empty() {
            return;
        }
        for event in &events {
            let kind = event.kind();
            for (filter, handler) in &handlers {
                if filter.is_none_or(|k| k == kind) {
                    handler(event);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_only_see_their_category() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(EventKind::Cues, move |e| sink.lock().push(e.clone()));

        bus.emit(vec![TrackEvent::BeatsUpdated, TrackEvent::CuesUpdated]);
        assert_eq!(*seen.lock(), vec![TrackEvent::CuesUpdated]);
    }

    #[test]
    fn channel_subscription_receives_events_in_order() {
        let bus = EventBus::new();
        let (id, rx) = bus.subscribe_channel(None);
        bus.emit(vec![TrackEvent::KeyChanged, TrackEvent::Analyzed]);
        assert_eq!(rx.try_recv().unwrap(), TrackEvent::KeyChanged);
        assert_eq!(rx.try_recv().unwrap(), TrackEvent::Analyzed);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(vec![TrackEvent::KeyChanged]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let (weak_bus, own_id) = (Arc::downgrade(&bus), slot.clone());
        let id = bus.subscribe_all(move |_| {
            if let (Some(bus), Some(id)) = (weak_bus.upgrade(), *own_id.lock()) {
                bus.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);
        bus.emit(vec![TrackEvent::Analyzed]);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
