//! Intrusive doubly linked list backed by a container implementing
//! `core::ops::IndexMut`.
//!
//! Elements are referred to by indices into the container, so the container
//! (an arena) exclusively owns the storage and the links never dangle.
use core::{fmt, ops};

use super::Init;

/// Linear linked list header.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ListHead<Index> {
    pub first: Option<Index>,
}

impl<Index: fmt::Debug> fmt::Debug for ListHead<Index> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ListHead({:?})", &self.first)
    }
}

impl<Index> Init for ListHead<Index> {
    const INIT: Self = Self { first: None };
}

/// Links to neighbor items.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Link<Index> {
    pub prev: Option<Index>,
    pub next: Option<Index>,
}

/// An error type indicating inconsistency in a linked list structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InconsistentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    AlreadyLinked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemError {
    NotLinked,
    Inconsistent(InconsistentError),
}

impl From<InconsistentError> for ItemError {
    #[inline(always)]
    fn from(x: InconsistentError) -> Self {
        Self::Inconsistent(x)
    }
}

/// Accessor to a linked list whose elements live in `pool`.
///
/// `map_link` projects an element to its link field. An element is on the
/// list iff its link field is `Some(_)`.
pub struct ListAccessor<'a, Index, Pool: ?Sized, MapLink> {
    head: &'a mut ListHead<Index>,
    pool: &'a mut Pool,
    map_link: MapLink,
}

impl<'a, Index, Pool, MapLink, Element> ListAccessor<'a, Index, Pool, MapLink>
where
    Pool: ops::IndexMut<Index, Output = Element> + ?Sized,
    MapLink: Fn(&mut Element) -> &mut Option<Link<Index>>,
    Element: 'a,
    Index: PartialEq + Copy,
{
    pub fn new(head: &'a mut ListHead<Index>, pool: &'a mut Pool, map_link: MapLink) -> Self {
        Self {
            head,
            pool,
            map_link,
        }
    }

    fn link(&mut self, item: Index) -> &mut Option<Link<Index>> {
        (self.map_link)(&mut self.pool[item])
    }

    pub fn front(&self) -> Option<Index> {
        self.head.first
    }

    pub fn is_linked(&mut self, item: Index) -> bool {
        self.link(item).is_some()
    }

    /// Get the element following `item`.
    pub fn next(&mut self, item: Index) -> Result<Option<Index>, ItemError> {
        let link = self.link(item).ok_or(ItemError::NotLinked)?;
        Ok(link.next)
    }

    /// Insert `item` at the front of the list.
    pub fn push_front(&mut self, item: Index) -> Result<(), InsertError> {
        if self.is_linked(item) {
            return Err(InsertError::AlreadyLinked);
        }

        let next = self.head.first;
        if let Some(next) = next {
            if let Some(next_link) = self.link(next) {
                next_link.prev = Some(item);
            }
        }

        *self.link(item) = Some(Link { prev: None, next });
        self.head.first = Some(item);
        Ok(())
    }

    /// Remove `item` from the list.
    pub fn remove(&mut self, item: Index) -> Result<(), ItemError> {
        let Link { prev, next } = self.link(item).ok_or(ItemError::NotLinked)?;

        match prev {
            Some(prev) => {
                let prev_link = self.link(prev).as_mut().ok_or(InconsistentError)?;
                prev_link.next = next;
            }
            None => {
                if self.head.first != Some(item) {
                    return Err(InconsistentError.into());
                }
                self.head.first = next;
            }
        }

        if let Some(next) = next {
            let next_link = self.link(next).as_mut().ok_or(InconsistentError)?;
            next_link.prev = prev;
        }

        *self.link(item) = None;
        Ok(())
    }
}
