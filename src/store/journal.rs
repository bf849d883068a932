use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// How many records may pile up in the journal before it is folded into a fresh snapshot.
pub const COMPACT_EVERY: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// One durable change to the progress, as appended to the journal.
pub struct Record
{
    /// Consecutive across the whole exploration; a snapshot remembers the last one folded into it.
    pub seq:      u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<(PositionKey, CacheEntry)>,
    /// The node taken off the frontier, and the children appended in its place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced: Option<(ExplorationNode, Vec<ExplorationNode>)>,
}

#[derive(Debug)]
/// The append-only log of changes made since the last snapshot.
///
/// A journal without a path only counts records, for stores that are never written anywhere.
pub struct Journal
{
    path:              Option<PathBuf>,
    file:              Option<File>,
    sequence:          u64,
    pending:           usize,
    pub compact_every: usize,
}

impl Journal
{
    pub fn new(path: Option<PathBuf>, sequence: u64) -> Journal
    {
        Journal {
            path,
            file: None,
            sequence,
            pending: 0,
            compact_every: COMPACT_EVERY,
        }
    }

    /// Where the journal of a snapshot lives.
    pub fn beside(snapshot: &Path) -> PathBuf
    {
        let mut path = snapshot.as_os_str().to_owned();
        path.push(".journal");
        PathBuf::from(path)
    }

    /// The sequence number of the last record written.
    pub fn sequence(&self) -> u64
    {
        self.sequence
    }

    /// Whether enough records have piled up to be worth a fresh snapshot.
    pub fn is_due(&self) -> bool
    {
        self.path.is_some() && self.pending >= self.compact_every
    }

    /// Durably appends a record built around the next sequence number.
    pub fn append(&mut self, resolved: Option<(PositionKey, CacheEntry)>, advanced: Option<(ExplorationNode, Vec<ExplorationNode>)>) -> Result<()>
    {
        let record = Record {
            seq: self.sequence + 1,
            resolved,
            advanced,
        };

        if let Some(path) = &self.path
        {
            let mut line = serde_json::to_vec(&record)
                .map_err(|e| Error::new(Kind::InternalError, format!("could not encode journal record {}: {}", record.seq, e)))?;
            line.push(b'\n');

            if self.file.is_none()
            {
                self.file = Some(OpenOptions::new().create(true).append(true).open(path)?);
            }
            if let Some(file) = self.file.as_mut()
            {
                file.write_all(&line)?;
                file.sync_data()?;
            }
            self.pending += 1;
        }

        self.sequence = record.seq;
        Ok(())
    }

    /// Forgets every record, once a snapshot holding all of them has been written.
    pub fn reset(&mut self) -> Result<()>
    {
        self.file = None;
        self.pending = 0;

        if let Some(path) = &self.path
        {
            match std::fs::remove_file(path)
            {
                | Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                | _ =>
                {}
            }
        }
        Ok(())
    }

    /// Folds the records of a journal that the state does not hold yet into it.
    ///
    /// Records already in the snapshot are skipped. An unterminated last line is a record whose append never
    /// returned, and is dropped.
    pub fn replay(path: &Path, state: &mut ProgressState) -> Result<usize>
    {
        let text = match std::fs::read_to_string(path)
        {
            | Ok(text) => text,
            | Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            | Err(e) => return Err(e.into()),
        };

        let mut lines = text.split('\n').collect::<Vec<_>>();
        if let Some(torn) = lines.pop().filter(|l| !l.is_empty())
        {
            log::warn!("dropping an unfinished journal record of {} bytes from {}", torn.len(), path.display());
        }

        let mut applied = 0;
        for (number, line) in lines.into_iter().enumerate()
        {
            let record: Record = serde_json::from_str(line)
                .map_err(|e| Error::corruption(format!("journal line {} is not readable: {}", number + 1, e)))?;

            if record.seq <= state.sequence
            {
                continue;
            }
            state.apply(record)?;
            applied += 1;
        }

        Ok(applied)
    }
}
