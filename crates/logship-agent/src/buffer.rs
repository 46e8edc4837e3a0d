use logship_core::LogRecord;
use std::collections::VecDeque;

/// Ordered buffer of records awaiting delivery
///
/// Owned exclusively by the agent loop; every mutation happens on that one
/// task.
#[derive(Default)]
pub struct RecordBuffer {
    records: VecDeque<LogRecord>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add one record at the back
    pub fn append(&mut self, record: LogRecord) {
        self.records.push_back(record);
    }

    /// Take the entire contents as one batch, leaving the buffer empty
    ///
    /// Called before a send so records arriving during the in-flight
    /// request accumulate separately instead of racing the batch.
    pub fn detach(&mut self) -> Vec<LogRecord> {
        self.records.drain(..).collect()
    }

    /// Put a failed batch back at the front, ahead of anything that arrived
    /// since, preserving the batch's internal order
    pub fn requeue_front(&mut self, batch: Vec<LogRecord>) {
        for record in batch.into_iter().rev() {
            self.records.push_front(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(message: &str) -> LogRecord {
        LogRecord::new("test", message)
    }

    fn messages(buffer: &mut RecordBuffer) -> Vec<String> {
        buffer.detach().into_iter().map(|r| r.message).collect()
    }

    #[test]
    fn test_append_and_detach_preserve_order() {
        let mut buffer = RecordBuffer::new();
        buffer.append(record("a"));
        buffer.append(record("b"));
        buffer.append(record("c"));
        assert_eq!(buffer.len(), 3);

        let batch = buffer.detach();
        assert!(buffer.is_empty());
        let msgs: Vec<_> = batch.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(msgs, ["a", "b", "c"]);
    }

    #[test]
    fn test_detach_empty_is_empty() {
        let mut buffer = RecordBuffer::new();
        assert!(buffer.detach().is_empty());
    }

    #[test]
    fn test_requeue_front_goes_ahead_of_newer_records() {
        let mut buffer = RecordBuffer::new();
        buffer.append(record("a"));
        buffer.append(record("b"));
        let failed = buffer.detach();

        // New records arrive while the batch is in flight
        buffer.append(record("c"));
        buffer.append(record("d"));

        buffer.requeue_front(failed);
        assert_eq!(messages(&mut buffer), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_requeue_into_empty_buffer() {
        let mut buffer = RecordBuffer::new();
        buffer.append(record("a"));
        buffer.append(record("b"));
        let failed = buffer.detach();

        buffer.requeue_front(failed);
        assert_eq!(messages(&mut buffer), ["a", "b"]);
    }
}
