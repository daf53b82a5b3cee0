//! Intrusive doubly-linked list of slabs, threaded through the `prev`/`next`
//! hooks in the slab headers. Owner-thread only.

use crate::slab::Slab;
use core::ptr::{self, NonNull};

pub struct SlabList {
    head: *mut Slab,
    tail: *mut Slab,
}

impl SlabList {
    pub const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    #[inline]
    pub fn front(&self) -> Option<NonNull<Slab>> {
        NonNull::new(self.head)
    }

    pub fn push_front(&mut self, mut slab: NonNull<Slab>) {
        // SAFETY: caller owns the slab and it is on no list.
        unsafe {
            let s = slab.as_mut();
            debug_assert!(s.prev.is_null() && s.next.is_null());
            s.next = self.head;
            if let Some(mut head) = NonNull::new(self.head) {
                head.as_mut().prev = slab.as_ptr();
            } else {
                self.tail = slab.as_ptr();
            }
        }
        self.head = slab.as_ptr();
    }

    pub fn push_back(&mut self, mut slab: NonNull<Slab>) {
        // SAFETY: caller owns the slab and it is on no list.
        unsafe {
            let s = slab.as_mut();
            debug_assert!(s.prev.is_null() && s.next.is_null());
            s.prev = self.tail;
            if let Some(mut tail) = NonNull::new(self.tail) {
                tail.as_mut().next = slab.as_ptr();
            } else {
                self.head = slab.as_ptr();
            }
        }
        self.tail = slab.as_ptr();
    }

    pub fn pop_front(&mut self) -> Option<NonNull<Slab>> {
        let slab = NonNull::new(self.head)?;
        self.remove(slab);
        Some(slab)
    }

    /// Unlink `slab`. The slab must currently be on this list.
    pub fn remove(&mut self, mut slab: NonNull<Slab>) {
        // SAFETY: caller guarantees membership, so the hooks are consistent.
        unsafe {
            let s = slab.as_mut();
            if let Some(mut prev) = NonNull::new(s.prev) {
                prev.as_mut().next = s.next;
            } else {
                debug_assert_eq!(self.head, slab.as_ptr());
                self.head = s.next;
            }
            if let Some(mut next) = NonNull::new(s.next) {
                next.as_mut().prev = s.prev;
            } else {
                debug_assert_eq!(self.tail, slab.as_ptr());
                self.tail = s.prev;
            }
            s.prev = ptr::null_mut();
            s.next = ptr::null_mut();
        }
    }

    /// Rotate the head to the tail; used by the full-list rescue scan.
    pub fn move_head_to_tail(&mut self) {
        if self.head == self.tail {
            return;
        }
        if let Some(head) = self.pop_front() {
            self.push_back(head);
        }
    }
}
