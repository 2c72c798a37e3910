//! Timestamped multi-channel sample bundles.
//!
//! A [`Packet`] is the unit of transfer between the acquisition thread and the
//! controller. Every column holds exactly one value per index entry; a value
//! of `None` marks a sample a sensor failed to deliver on that tick.
//!
//! Packets convert losslessly to a row-major [`Table`] for plotting and
//! persistence, and to an opaque binary encoding for transport.

use crate::error::{CranioError, Result};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// One named column of a packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Immutable bundle of samples sharing one index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Packet {
    index: Vec<Timestamp>,
    data: Vec<Column>,
}

impl Packet {
    /// Create a packet, checking that every column matches the index length
    /// and that column names are unique.
    pub fn new(index: Vec<Timestamp>, data: Vec<Column>) -> Result<Self> {
        let packet = Self { index, data };
        packet.validate()?;
        Ok(packet)
    }

    /// Packet with no index entries and no columns.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Packet holding a single sample per channel.
    pub fn single(
        timestamp: Timestamp,
        values: impl IntoIterator<Item = (String, Option<f64>)>,
    ) -> Result<Self> {
        let data = values
            .into_iter()
            .map(|(name, value)| Column::new(name, vec![value]))
            .collect();
        Self::new(vec![timestamp], data)
    }

    fn validate(&self) -> Result<()> {
        for (i, column) in self.data.iter().enumerate() {
            if column.values.len() != self.index.len() {
                return Err(CranioError::InvalidPacket(format!(
                    "column '{}' has {} values for {} index entries",
                    column.name,
                    column.values.len(),
                    self.index.len()
                )));
            }
            if self.data[..i].iter().any(|c| c.name == column.name) {
                return Err(CranioError::InvalidPacket(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn index(&self) -> &[Timestamp] {
        &self.index
    }

    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.data
    }

    /// Number of index entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Column names in column order.
    pub fn channels(&self) -> Vec<String> {
        self.data.iter().map(|c| c.name.clone()).collect()
    }

    /// Values of one column.
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.data
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    fn sorted_channels(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.data.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Whether both packets carry the same set of channel names.
    pub fn same_channels(&self, other: &Packet) -> bool {
        self.sorted_channels() == other.sorted_channels()
    }

    /// Serialize to the binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Parse a packet from the binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let packet: Packet = bincode::deserialize(bytes)?;
        packet.validate()?;
        Ok(packet)
    }

    /// Row-major view: one row per index entry, one column per channel.
    pub fn as_table(&self) -> Table {
        let rows = (0..self.index.len())
            .map(|row| self.data.iter().map(|c| c.values[row]).collect())
            .collect();
        Table {
            columns: self.channels(),
            index: self.index.clone(),
            rows,
        }
    }

    /// Build a packet back from its table form.
    pub fn from_table(table: &Table) -> Result<Self> {
        if table.rows.len() != table.index.len() {
            return Err(CranioError::InvalidPacket(format!(
                "table has {} rows for {} index entries",
                table.rows.len(),
                table.index.len()
            )));
        }
        let mut data: Vec<Column> = table
            .columns
            .iter()
            .map(|name| Column::new(name.clone(), Vec::with_capacity(table.rows.len())))
            .collect();
        for row in &table.rows {
            if row.len() != data.len() {
                return Err(CranioError::InvalidPacket(format!(
                    "table row has {} cells for {} columns",
                    row.len(),
                    data.len()
                )));
            }
            for (column, value) in data.iter_mut().zip(row) {
                column.values.push(*value);
            }
        }
        Self::new(table.index.clone(), data)
    }

    /// Concatenate packets in order.
    ///
    /// All packets must carry the same channel set; the result uses the
    /// column order of the first packet.
    pub fn concat(packets: &[Packet]) -> Result<Packet> {
        let Some(first) = packets.first() else {
            return Ok(Packet::empty());
        };

        let total: usize = packets.iter().map(Packet::len).sum();
        let mut index = Vec::with_capacity(total);
        let mut data: Vec<Column> = first
            .data
            .iter()
            .map(|c| Column::new(c.name.clone(), Vec::with_capacity(total)))
            .collect();

        for packet in packets {
            if !first.same_channels(packet) {
                return Err(CranioError::SchemaMismatch {
                    expected: first.channels(),
                    found: packet.channels(),
                });
            }
            index.extend_from_slice(&packet.index);
            for column in data.iter_mut() {
                // Presence is guaranteed by the channel set check above
                if let Some(values) = packet.column(&column.name) {
                    column.values.extend_from_slice(values);
                }
            }
        }

        Packet::new(index, data)
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.data.len() == other.data.len()
            && self
                .data
                .iter()
                .all(|c| other.column(&c.name) == Some(c.values.as_slice()))
    }
}

/// Row-major tabular form of a packet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub index: Vec<Timestamp>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl Table {
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Position of a column by name.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Copy out one column.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let pos = self.column_position(name)?;
        Some(self.rows.iter().map(|row| row[pos]).collect())
    }

    /// Iterate rows together with their index value.
    pub fn iter_rows(&self) -> impl Iterator<Item = (&Timestamp, &[Option<f64>])> {
        self.index.iter().zip(self.rows.iter().map(Vec::as_slice))
    }
}
