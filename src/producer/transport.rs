use crate::error::TransportSendFailure;

/// Metadata describing where a sent record landed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordMetadata {
    /// The source checkpoint carried by the record.
    pub checkpoint: String,
    /// The destination topic of the record.
    pub topic: String,
    /// The destination partition of the record.
    pub partition: i32,
    /// The position of the record within the batch it was sent in.
    pub event_index: usize,
}

/// A callback invoked exactly once per sent record.
///
/// The error is `None` when the record was delivered.
pub type SendCallback = Box<dyn FnOnce(RecordMetadata, Option<TransportSendFailure>) + Send + 'static>;

/// A transport to which records are handed for asynchronous delivery.
///
/// Callbacks may be invoked from a thread owned by the transport, and in any order.
pub trait Transport: Send + Sync + 'static {
    /// The record type accepted by this transport.
    type Record: Send;

    /// Hand a record to the transport for delivery.
    ///
    /// This may block if the transport needs to apply backpressure.
    fn send(&self, record: Self::Record, callback: SendCallback);

    /// Enable or disable any periodic flush the transport would otherwise perform.
    fn set_periodic_flush(&self, enabled: bool);
}
