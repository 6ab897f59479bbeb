//! Slicing a directory into pages addressable by the digit keys `1`-`9`.
//!
//! Slot placement is fixed: a "previous page" control always sits on key
//! `1` and a "next page" control always sits on key `9`, so the same key
//! keeps the same role from page to page. The three pages hold 8, 7 and 8
//! entries respectively, which is where the 23-entry directory limit comes
//! from.

use crate::tree::Entry;

/// Number of digit keys
pub const SLOT_COUNT: usize = 9;

const FIRST_PAGE_ITEMS: usize = 8;
const MIDDLE_PAGE_ITEMS: usize = 7;
const LAST_PAGE_ITEMS: usize = 8;

/// Anything that can occupy a digit slot
#[derive(Debug, Clone)]
pub enum Slot {
    Item(Entry),
    PreviousPage,
    NextPage,
}

impl Slot {
    pub fn label(&self) -> &str {
        match self {
            Slot::Item((key, _)) => key,
            Slot::PreviousPage => "« previous",
            Slot::NextPage => "next »",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub slots: Vec<Slot>,
    /// The page actually shown, after clamping
    pub page: usize,
    pub total_pages: usize,
}

impl Page {
    /// The slot behind digit key `digit` (1-based)
    pub fn slot(&self, digit: usize) -> Option<&Slot> {
        if digit == 0 {
            return None;
        }
        self.slots.get(digit - 1)
    }

    /// Number of real entries on this page
    pub fn item_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Item(_)))
            .count()
    }
}

/// Number of pages needed for `count` entries.
///
/// Two pages hold at most 8 + 7 items: once page 1 shows a previous-page
/// control, a count above 15 also needs its next-page control, so 16 and
/// 17 entries already spill onto a third page.
pub fn total_pages(count: usize) -> usize {
    if count <= SLOT_COUNT {
        1
    } else if count <= FIRST_PAGE_ITEMS + MIDDLE_PAGE_ITEMS {
        2
    } else {
        3
    }
}

/// Lay out `entries` for `page`; out-of-range pages are clamped
pub fn paginate(entries: &[Entry], page: usize) -> Page {
    let count = entries.len();
    let total = total_pages(count);
    let page = page.min(total - 1);

    let mut slots = Vec::with_capacity(SLOT_COUNT);
    match page {
        0 if total == 1 => {
            slots.extend(entries.iter().take(SLOT_COUNT).cloned().map(Slot::Item));
        }
        0 => {
            slots.extend(entries.iter().take(FIRST_PAGE_ITEMS).cloned().map(Slot::Item));
            slots.push(Slot::NextPage);
        }
        1 => {
            slots.push(Slot::PreviousPage);
            slots.extend(
                entries
                    .iter()
                    .skip(FIRST_PAGE_ITEMS)
                    .take(MIDDLE_PAGE_ITEMS)
                    .cloned()
                    .map(Slot::Item),
            );
            if count > FIRST_PAGE_ITEMS + MIDDLE_PAGE_ITEMS {
                slots.push(Slot::NextPage);
            }
        }
        _ => {
            slots.push(Slot::PreviousPage);
            slots.extend(
                entries
                    .iter()
                    .skip(FIRST_PAGE_ITEMS + MIDDLE_PAGE_ITEMS)
                    .take(LAST_PAGE_ITEMS)
                    .cloned()
                    .map(Slot::Item),
            );
        }
    }

    Page {
        slots,
        page,
        total_pages: total,
    }
}
