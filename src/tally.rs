//! Insertion-ordered word counts.
//!
//! [`Tally`] is a hash index over an arena of slots threaded into a doubly
//! linked list. Lookups go through the index, traversal follows the list, and
//! removal unlinks a slot in O(1) and recycles it through a free list. The
//! traversal order is the order in which each word was first added, which is
//! what makes packing and worker replies deterministic.

use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Slot {
    word: String,
    count: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Tally {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Adds `count` to `word`, appending it at the back if it is new.
    pub fn add(&mut self, word: &str, count: u64) {
        if let Some(&at) = self.index.get(word) {
            if let Some(slot) = self.slots[at].as_mut() {
                slot.count = slot.count.saturating_add(count);
            }
            return;
        }

        let slot = Slot {
            word: word.to_string(),
            count,
            prev: self.tail,
            next: None,
        };
        let at = match self.free.pop() {
            Some(at) => {
                self.slots[at] = Some(slot);
                at
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };

        match self.tail {
            Some(tail) => self.link_mut(tail).next = Some(at),
            None => self.head = Some(at),
        }
        self.tail = Some(at);
        self.index.insert(word.to_string(), at);
    }

    /// Folds every entry of `other` into `self`, in `other`'s order.
    pub fn merge(&mut self, other: &Tally) {
        for (word, count) in other.iter() {
            self.add(word, count);
        }
    }

    pub fn get(&self, word: &str) -> Option<u64> {
        let at = *self.index.get(word)?;
        self.slots[at].as_ref().map(|slot| slot.count)
    }

    pub fn remove(&mut self, word: &str) -> Option<u64> {
        let at = self.index.remove(word)?;
        let slot = self.slots[at].take()?;

        match slot.prev {
            Some(prev) => self.link_mut(prev).next = slot.next,
            None => self.head = slot.next,
        }
        match slot.next {
            Some(next) => self.link_mut(next).prev = slot.prev,
            None => self.tail = slot.prev,
        }
        self.free.push(at);

        Some(slot.count)
    }

    /// The oldest entry still present.
    pub fn front(&self) -> Option<(&str, u64)> {
        let slot = self.slots[self.head?].as_ref()?;
        Some((slot.word.as_str(), slot.count))
    }

    pub fn front_mut(&mut self) -> Option<(&str, &mut u64)> {
        let slot = self.slots[self.head?].as_mut()?;
        Some((slot.word.as_str(), &mut slot.count))
    }

    pub fn pop_front(&mut self) -> Option<(String, u64)> {
        let word = self.front()?.0.to_string();
        let count = self.remove(&word)?;
        Some((word, count))
    }

    /// Sum of every count in the tally.
    pub fn total(&self) -> u64 {
        self.iter().fold(0u64, |acc, (_, count)| acc.saturating_add(count))
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tally: self,
            cursor: self.head,
        }
    }

    fn link_mut(&mut self, at: usize) -> &mut Slot {
        // every linked index refers to an occupied slot
        match self.slots[at].as_mut() {
            Some(slot) => slot,
            None => unreachable!("linked slot {at} is vacant"),
        }
    }
}

pub struct Iter<'a> {
    tally: &'a Tally,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.tally.slots[self.cursor?].as_ref()?;
        self.cursor = slot.next;
        Some((slot.word.as_str(), slot.count))
    }
}

impl<'a> IntoIterator for &'a Tally {
    type Item = (&'a str, u64);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Two tallies are equal when they hold the same entries in the same order.
impl PartialEq for Tally {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl Eq for Tally {}

impl<S: AsRef<str>> Extend<(S, u64)> for Tally {
    fn extend<T: IntoIterator<Item = (S, u64)>>(&mut self, iter: T) {
        for (word, count) in iter {
            self.add(word.as_ref(), count);
        }
    }
}

impl<S: AsRef<str>> FromIterator<(S, u64)> for Tally {
    fn from_iter<T: IntoIterator<Item = (S, u64)>>(iter: T) -> Self {
        let mut tally = Tally::new();
        tally.extend(iter);
        tally
    }
}
