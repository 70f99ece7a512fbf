use super::record::Record;
use crate::core::Result;
use crate::entity::FieldValue;
use std::iter::FusedIterator;

/// Lazy, forward-only sequence of the rows matching a record's filter.
///
/// Each item pairs the row's primary key (NULL for keyless entities) with an
/// independent copy of the row. The query runs on the first `next`, and the
/// sequence ends for good when the cursor is exhausted or fails; it cannot be
/// restarted.
#[derive(Debug)]
pub struct FindAll<'c> {
    cursor: Record<'c>,
    started: bool,
    finished: bool,
}

impl<'c> FindAll<'c> {
    pub(crate) fn new(cursor: Record<'c>) -> Self {
        Self {
            cursor,
            started: false,
            finished: false,
        }
    }
}

impl<'c> Iterator for FindAll<'c> {
    type Item = Result<(FieldValue, Record<'c>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let fetched = if self.started {
            self.cursor.find_next()
        } else {
            self.started = true;
            self.cursor.find_first()
        };
        match fetched {
            Ok(true) => {
                let key = self.cursor.key().cloned().unwrap_or(FieldValue::Null);
                Some(Ok((key, self.cursor.clone())))
            }
            Ok(false) => {
                self.finished = true;
                self.cursor.invalidate_statements();
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for FindAll<'_> {}
