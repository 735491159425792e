// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Delivery of due metadata to its consumer.
//!
//! The renderer hands every due value to a [`Delivery`], which either invokes
//! the consumer in place ([`Delivery::Direct`]) or posts a
//! [`MetadataMessage`] to a target context ([`Delivery::Deferred`]).
//!
//! ## Target Contexts
//!
//! Anything implementing [`MessageTarget`] can receive deferred deliveries:
//!
//! - `std::sync::mpsc::Sender` / `SyncSender` for consumers polling a queue
//! - `futures::channel::mpsc::UnboundedSender` for async consumers
//! - [`ContextThread`], a dedicated thread owning the consumer
//!
//! Messages are posted in the order items become due and targets are
//! expected to run them in that order. Posting never waits for the consumer.
//! A target that cannot accept a message hands it back as [`Rejected`], so
//! the renderer can keep the value pending and post it again on a later tick.
//!
//! ## Stale Messages
//!
//! A posted message is never retracted. Each message carries the delivery
//! [`Generation`] it was posted under. When stale-drop is enabled the renderer
//! advances the generation on seek and disable, and receivers using
//! [`MetadataMessage::dispatch_if_current`] (as [`ContextThread`] does) skip
//! messages from older generations.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::{self, JoinHandle},
};

use tracing::{debug, error, trace};

use crate::{Error, Result};

/// Consumer of rendered metadata.
pub trait MetadataOutput<T> {
    /// Invoked once for each metadata value that became due.
    fn on_metadata(&mut self, metadata: T);
}

impl<T, F: FnMut(T)> MetadataOutput<T> for F {
    fn on_metadata(&mut self, metadata: T) {
        self(metadata)
    }
}

/// Shared delivery generation counter.
///
/// Cloning shares the counter. The renderer is the only writer.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    /// Creates a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current generation.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Returns `true` if `generation` is still current.
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }

    /// Starts a new generation, invalidating messages posted so far.
    pub(crate) fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// A single deferred delivery.
#[derive(Debug)]
pub struct MetadataMessage<T> {
    generation: u64,
    value: T,
}

impl<T> MetadataMessage<T> {
    pub(crate) fn new(generation: u64, value: T) -> Self {
        Self { generation, value }
    }

    /// Generation the message was posted under.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Borrows the carried value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Unwraps the carried value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Hands the value to `output`.
    pub fn dispatch<O: MetadataOutput<T> + ?Sized>(self, output: &mut O) {
        output.on_metadata(self.value);
    }

    /// Hands the value to `output` unless `generation` moved on since the
    /// message was posted. Returns `true` if the value was delivered.
    pub fn dispatch_if_current<O: MetadataOutput<T> + ?Sized>(
        self,
        output: &mut O,
        generation: &Generation,
    ) -> bool {
        if !generation.is_current(self.generation) {
            trace!(
                "Dropping stale metadata message (generation {} < {})",
                self.generation,
                generation.current()
            );
            return false;
        }
        self.dispatch(output);
        true
    }
}

/// A message a target did not accept, handed back untouched.
#[derive(Debug)]
pub struct Rejected<T> {
    /// Why the target refused the message.
    pub error: Error,
    /// The refused message.
    pub message: MetadataMessage<T>,
}

impl<T> Rejected<T> {
    /// Pairs a refused message with the reason.
    pub fn new(error: Error, message: MetadataMessage<T>) -> Self {
        Self { error, message }
    }
}

impl<T> From<Rejected<T>> for Error {
    fn from(rejected: Rejected<T>) -> Self {
        rejected.error
    }
}

/// Queue of a target context accepting deferred deliveries.
pub trait MessageTarget<T> {
    /// Submits `message` without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns the message inside [`Rejected`] together with
    /// - [`Error::TargetClosed`] if the context no longer accepts messages
    /// - [`Error::TargetFull`] if a bounded queue has no room
    fn post(&self, message: MetadataMessage<T>) -> std::result::Result<(), Rejected<T>>;
}

impl<T> MessageTarget<T> for mpsc::Sender<MetadataMessage<T>> {
    fn post(&self, message: MetadataMessage<T>) -> std::result::Result<(), Rejected<T>> {
        self.send(message)
            .map_err(|mpsc::SendError(message)| Rejected::new(Error::TargetClosed, message))
    }
}

impl<T> MessageTarget<T> for mpsc::SyncSender<MetadataMessage<T>> {
    fn post(&self, message: MetadataMessage<T>) -> std::result::Result<(), Rejected<T>> {
        self.try_send(message).map_err(|err| match err {
            mpsc::TrySendError::Full(message) => Rejected::new(Error::TargetFull, message),
            mpsc::TrySendError::Disconnected(message) => {
                Rejected::new(Error::TargetClosed, message)
            }
        })
    }
}

impl<T> MessageTarget<T> for futures::channel::mpsc::UnboundedSender<MetadataMessage<T>> {
    fn post(&self, message: MetadataMessage<T>) -> std::result::Result<(), Rejected<T>> {
        self.unbounded_send(message)
            .map_err(|err| Rejected::new(Error::TargetClosed, err.into_inner()))
    }
}

/// How due metadata reaches its consumer.
///
/// Both variants are `Send` so a renderer can be built on one thread and
/// driven from a playback thread. A consumer tied to its thread (holding
/// `Rc` or `RefCell` state) belongs behind a [`MessageTarget`] owned by that
/// thread, such as a channel it drains itself.
pub enum Delivery<T> {
    /// The consumer runs synchronously inside the renderer's tick.
    Direct(Box<dyn MetadataOutput<T> + Send>),
    /// The value is posted to a target context.
    Deferred {
        /// Queue of the target context.
        target: Box<dyn MessageTarget<T> + Send>,
        /// Generation stamped on posted messages.
        generation: Generation,
    },
}

impl<T> Delivery<T> {
    /// Invokes `output` in place on the driver's thread.
    pub fn direct(output: impl MetadataOutput<T> + Send + 'static) -> Self {
        Delivery::Direct(Box::new(output))
    }

    /// Posts values to `target` with a fresh, unobserved generation counter.
    pub fn deferred(target: impl MessageTarget<T> + Send + 'static) -> Self {
        Self::deferred_with_generation(target, Generation::new())
    }

    /// Posts values to `target`, stamping them with `generation`.
    ///
    /// The receiving side keeps a clone of `generation` to recognise stale
    /// messages.
    pub fn deferred_with_generation(
        target: impl MessageTarget<T> + Send + 'static,
        generation: Generation,
    ) -> Self {
        Delivery::Deferred {
            target: Box::new(target),
            generation,
        }
    }

    /// Returns `true` if the consumer runs on another context.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Delivery::Deferred { .. })
    }

    /// Generation counter of a deferred delivery.
    pub fn generation(&self) -> Option<&Generation> {
        match self {
            Delivery::Direct(_) => None,
            Delivery::Deferred { generation, .. } => Some(generation),
        }
    }

    /// Invalidates every message posted so far. No-op for direct delivery.
    pub(crate) fn invalidate(&self) {
        if let Delivery::Deferred { generation, .. } = self {
            let next = generation.advance();
            debug!("Delivery generation advanced to {}", next);
        }
    }

    /// Delivers `value` to the consumer, directly or by posting a message.
    ///
    /// A refused post hands the value back inside [`Rejected`].
    pub(crate) fn deliver(&mut self, value: T) -> std::result::Result<(), Rejected<T>> {
        match self {
            Delivery::Direct(output) => {
                output.on_metadata(value);
                Ok(())
            }
            Delivery::Deferred { target, generation } => {
                target.post(MetadataMessage::new(generation.current(), value))
            }
        }
    }
}

impl<T: Send + 'static> From<ContextThread<T>> for Delivery<T> {
    /// Posts to the thread and shares its generation counter.
    fn from(context: ContextThread<T>) -> Self {
        let generation = context.generation();
        Delivery::deferred_with_generation(context, generation)
    }
}

/// A dedicated thread acting as target context.
///
/// The thread owns the consumer and runs it for every message, in
/// submission order, skipping messages made stale by the renderer. Dropping
/// the last sender (including this handle) lets the thread drain its queue
/// and exit.
///
/// # Examples
///
/// ```
/// use metarender::delivery::ContextThread;
///
/// let context = ContextThread::spawn("metadata-ui", |title: String| {
///     println!("now showing {title}");
/// })
/// .unwrap();
/// context.shutdown().unwrap();
/// ```
pub struct ContextThread<T> {
    sender: Option<mpsc::Sender<MetadataMessage<T>>>,
    handle: Option<JoinHandle<()>>,
    generation: Generation,
}

impl<T: Send + 'static> ContextThread<T> {
    /// Spawns a named thread that feeds incoming messages to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the thread cannot be spawned.
    pub fn spawn<O>(name: impl Into<String>, mut output: O) -> Result<Self>
    where
        O: MetadataOutput<T> + Send + 'static,
    {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<MetadataMessage<T>>();
        let generation = Generation::new();
        let watched = generation.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            debug!("Metadata context thread \"{}\" started", name);
            for message in receiver {
                message.dispatch_if_current(&mut output, &watched);
            }
            debug!("Metadata context thread \"{}\" stopped", name);
        })?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            generation,
        })
    }
}

impl<T> ContextThread<T> {
    /// Returns a sender posting to this thread.
    pub fn target(&self) -> Option<mpsc::Sender<MetadataMessage<T>>> {
        self.sender.clone()
    }

    /// Returns the generation counter the thread checks messages against.
    pub fn generation(&self) -> Generation {
        self.generation.clone()
    }

    /// Closes this handle's sender and waits for the thread to drain.
    ///
    /// Blocks until every other sender is dropped as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if the consumer panicked.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<()> {
        self.sender = None;
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Other("Metadata consumer panicked.".to_string())),
            None => Ok(()),
        }
    }
}

impl<T> MessageTarget<T> for ContextThread<T> {
    fn post(&self, message: MetadataMessage<T>) -> std::result::Result<(), Rejected<T>> {
        match &self.sender {
            Some(sender) => sender.post(message),
            None => Err(Rejected::new(Error::TargetClosed, message)),
        }
    }
}

impl<T> Drop for ContextThread<T> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown_inner() {
            error!("Failed to stop metadata context thread: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn direct_delivery_runs_in_place() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut delivery = Delivery::direct(move |value: u32| sink.lock().unwrap().push(value));
        delivery.deliver(1).unwrap();
        delivery.deliver(2).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert!(!delivery.is_deferred());
        assert!(delivery.generation().is_none());
    }

    #[test]
    fn deferred_delivery_only_enqueues() {
        let (sender, receiver) = mpsc::channel();
        let mut delivery = Delivery::deferred(sender);
        delivery.deliver("a").unwrap();
        delivery.deliver("b").unwrap();
        let values: Vec<_> = receiver.try_iter().map(MetadataMessage::into_value).collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn closed_target_is_reported() {
        let (sender, receiver) = mpsc::channel::<MetadataMessage<u8>>();
        drop(receiver);
        let mut delivery = Delivery::deferred(sender);
        let rejected = delivery.deliver(1).unwrap_err();
        assert!(matches!(rejected.error, Error::TargetClosed));
        assert_eq!(rejected.message.into_value(), 1);
    }

    #[test]
    fn bounded_target_hands_back_refused_message() {
        let (sender, receiver) = mpsc::sync_channel::<MetadataMessage<u8>>(1);
        let mut delivery = Delivery::deferred(sender);
        delivery.deliver(1).unwrap();
        let rejected = delivery.deliver(2).unwrap_err();
        assert!(matches!(rejected.error, Error::TargetFull));
        assert_eq!(*rejected.message.value(), 2);

        assert_eq!(receiver.recv().unwrap().into_value(), 1);
        delivery.deliver(rejected.message.into_value()).unwrap();
        assert_eq!(receiver.recv().unwrap().into_value(), 2);
    }

    #[test]
    fn rejected_message_converts_into_its_error() {
        let (sender, receiver) = futures::channel::mpsc::unbounded::<MetadataMessage<u8>>();
        drop(receiver);
        let err: Error = sender.post(MetadataMessage::new(0, 5)).unwrap_err().into();
        assert!(matches!(err, Error::TargetClosed));
    }

    #[test]
    fn invalidated_messages_are_skipped() {
        let (sender, receiver) = mpsc::channel();
        let mut delivery = Delivery::deferred(sender);
        let generation = delivery.generation().unwrap().clone();
        delivery.deliver(1u8).unwrap();
        delivery.invalidate();
        delivery.deliver(2u8).unwrap();

        let mut seen = Vec::new();
        let mut output = |value: u8| seen.push(value);
        let delivered: Vec<bool> = receiver
            .try_iter()
            .map(|message| message.dispatch_if_current(&mut output, &generation))
            .collect();
        assert_eq!(delivered, vec![false, true]);
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn context_thread_preserves_submission_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let context = ContextThread::spawn("order-test", move |value: u32| {
            sink.lock().unwrap().push(value)
        })
        .unwrap();
        let mut delivery = Delivery::from(context);
        for value in 0..100 {
            delivery.deliver(value).unwrap();
        }
        drop(delivery);
        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn futures_channel_target() {
        use futures::StreamExt;

        let (sender, receiver) = futures::channel::mpsc::unbounded();
        let mut delivery = Delivery::deferred(sender);
        delivery.deliver(7u8).unwrap();
        delivery.deliver(8u8).unwrap();
        drop(delivery);
        let values: Vec<u8> = futures::executor::block_on(
            receiver.map(MetadataMessage::into_value).collect(),
        );
        assert_eq!(values, vec![7, 8]);
    }
}
