//! Store: the buffer between the acquisition thread and durable storage.
//!
//! Packets move through three stages:
//!
//! 1. **cached** - written by the producer, not yet seen by the controller
//! 2. **pending** - returned by [`Store::read`], not yet persisted
//! 3. **flushed** - committed to the [`MeasurementSink`] by [`Store::flush`]
//!
//! `flush` is the durability boundary. It commits the pending packets, in
//! production order, as one table. Packets that were never read stay cached.
//! If the sink fails nothing is cleared, so the next flush retries the same
//! data.
//!
//! Neither queue has a capacity limit. Dropping or refusing a sample would
//! lose it, so the size is kept in check by the controller draining the
//! store every UI interval.

use crate::backend::packet::{Packet, Table};
use crate::error::{CranioError, Result};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Durable destination of flushed measurement data
pub trait MeasurementSink: Send {
    /// Persist a table atomically: all rows or none
    fn persist(&mut self, table: &Table) -> Result<()>;
}

/// Sink keeping committed tables in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Vec<Table>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Total number of committed rows
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(Table::len).sum()
    }
}

impl MeasurementSink for MemorySink {
    fn persist(&mut self, table: &Table) -> Result<()> {
        self.tables.push(table.clone());
        Ok(())
    }
}

#[derive(Default)]
struct Buffers {
    cache: VecDeque<Packet>,
    pending: VecDeque<Packet>,
    flushed: usize,
}

/// Thread-safe packet buffer with explicit read and flush
pub struct Store {
    buffers: Mutex<Buffers>,
    sink: Mutex<Box<dyn MeasurementSink>>,
}

impl Store {
    pub fn new(sink: Box<dyn MeasurementSink>) -> Self {
        Self {
            buffers: Mutex::new(Buffers::default()),
            sink: Mutex::new(sink),
        }
    }

    /// Store that keeps flushed data in memory
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemorySink::new()))
    }

    fn buffers(&self) -> Result<MutexGuard<'_, Buffers>> {
        self.buffers
            .lock()
            .map_err(|e| CranioError::Channel(format!("Store lock poisoned: {}", e)))
    }

    /// Append a packet to the cache
    pub fn write(&self, packet: Packet) -> Result<()> {
        self.buffers()?.cache.push_back(packet);
        Ok(())
    }

    /// Take the cached packets as one table
    ///
    /// The packets stay pending until the next successful [`Store::flush`].
    pub fn read(&self) -> Result<Table> {
        let mut buffers = self.buffers()?;
        let taken: Vec<Packet> = buffers.cache.drain(..).collect();
        let table = match Packet::concat(&taken) {
            Ok(packet) => packet.as_table(),
            Err(e) => {
                // Put them back so no sample is lost
                for packet in taken.into_iter().rev() {
                    buffers.cache.push_front(packet);
                }
                return Err(e);
            }
        };
        buffers.pending.extend(taken);
        Ok(table)
    }

    /// Commit pending packets to the sink
    ///
    /// Returns the number of packets committed. On failure the packets stay
    /// pending and the error is returned.
    pub fn flush(&self) -> Result<usize> {
        let mut sink = self
            .sink
            .lock()
            .map_err(|e| CranioError::Channel(format!("Store sink lock poisoned: {}", e)))?;

        let pending: Vec<Packet> = self.buffers()?.pending.drain(..).collect();
        if pending.is_empty() {
            return Ok(0);
        }
        let count = pending.len();

        let result = Packet::concat(&pending).and_then(|packet| sink.persist(&packet.as_table()));

        let mut buffers = self.buffers()?;
        match result {
            Ok(()) => {
                buffers.flushed += count;
                tracing::debug!("Flushed {} packets", count);
                Ok(count)
            }
            Err(e) => {
                tracing::error!("Flush of {} packets failed, retaining data: {}", count, e);
                for packet in pending.into_iter().rev() {
                    buffers.pending.push_front(packet);
                }
                Err(e)
            }
        }
    }

    /// Read and flush in one step, returning the table that was read
    pub fn drain(&self) -> Result<Table> {
        let table = self.read()?;
        self.flush()?;
        Ok(table)
    }

    /// Packets committed so far
    pub fn flushed_count(&self) -> usize {
        self.buffers().map(|b| b.flushed).unwrap_or(0)
    }

    /// Packets written but not yet read
    pub fn cached_len(&self) -> usize {
        self.buffers().map(|b| b.cache.len()).unwrap_or(0)
    }

    /// Packets read but not yet flushed
    pub fn pending_len(&self) -> usize {
        self.buffers().map(|b| b.pending.len()).unwrap_or(0)
    }
}
