use crate::index::OrderedIndex;
use bytes::Bytes;
use common::{DbError, DbResult, PageId, RowPosition};

/// Slotted page held in memory: tuple payloads plus a byte budget. Slots
/// are never reused; a deleted tuple leaves a vacant slot behind.
#[derive(Debug, Default)]
pub(crate) struct HeapPage {
    slots: Vec<Option<Bytes>>,
    used: usize,
}

impl HeapPage {
    pub(crate) fn can_fit(&self, len: usize, page_size: usize) -> bool {
        self.used + len <= page_size && self.slots.len() < u16::MAX as usize
    }

    pub(crate) fn append(&mut self, payload: Bytes) -> u16 {
        let slot = self.slots.len() as u16;
        self.used += payload.len();
        self.slots.push(Some(payload));
        slot
    }

    pub(crate) fn get(&self, slot: u16) -> Option<&Bytes> {
        self.slots.get(slot as usize)?.as_ref()
    }

    pub(crate) fn replace(&mut self, slot: u16, payload: Bytes) -> DbResult<()> {
        let cell = self
            .slots
            .get_mut(slot as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| DbError::NotFound(format!("no tuple in slot {slot}")))?;
        self.used = self.used - cell.len() + payload.len();
        *cell = payload;
        Ok(())
    }

    pub(crate) fn vacate(&mut self, slot: u16) -> DbResult<()> {
        let cell = self
            .slots
            .get_mut(slot as usize)
            .ok_or_else(|| DbError::NotFound(format!("no slot {slot}")))?;
        match cell.take() {
            Some(payload) => {
                self.used -= payload.len();
                Ok(())
            }
            None => Err(DbError::NotFound(format!("slot {slot} already vacant"))),
        }
    }

    pub(crate) fn slot_count(&self) -> u16 {
        self.slots.len() as u16
    }
}

/// One table's pages and its ordered indexes.
#[derive(Debug, Default)]
pub(crate) struct TableHeap {
    pub(crate) pages: Vec<HeapPage>,
    pub(crate) indexes: Vec<OrderedIndex>,
}

impl TableHeap {
    pub(crate) fn insert(&mut self, payload: Bytes, page_size: usize) -> RowPosition {
        let needs_new_page = match self.pages.last() {
            Some(page) => !page.can_fit(payload.len(), page_size),
            None => true,
        };
        if needs_new_page {
            self.pages.push(HeapPage::default());
        }
        let last = self.pages.len() - 1;
        let slot = self.pages[last].append(payload);
        RowPosition {
            page_id: PageId(last as u64),
            slot,
        }
    }

    pub(crate) fn get(&self, pos: RowPosition) -> Option<&Bytes> {
        self.pages.get(pos.page_id.0 as usize)?.get(pos.slot)
    }

    pub(crate) fn page_mut(&mut self, pos: RowPosition) -> DbResult<&mut HeapPage> {
        self.pages
            .get_mut(pos.page_id.0 as usize)
            .ok_or_else(|| DbError::NotFound(format!("page {} not allocated", pos.page_id.0)))
    }

    /// Position of the first live tuple after `after`, in page/slot order.
    pub(crate) fn next_live(&self, after: Option<RowPosition>) -> Option<(RowPosition, &Bytes)> {
        let (mut page_idx, mut slot) = match after {
            Some(pos) => (pos.page_id.0 as usize, pos.slot + 1),
            None => (0, 0),
        };
        while let Some(page) = self.pages.get(page_idx) {
            while slot < page.slot_count() {
                let pos = RowPosition {
                    page_id: PageId(page_idx as u64),
                    slot,
                };
                if let Some(payload) = page.get(slot) {
                    return Some((pos, payload));
                }
                slot += 1;
            }
            page_idx += 1;
            slot = 0;
        }
        None
    }
}
