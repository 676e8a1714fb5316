//! Per-thread resolution stack for cycle detection.
//!
//! Each in-flight resolution pushes its service key onto a thread-local
//! stack. Revisiting a key already on the stack means the chain curled
//! back on itself; the error carries the full cycle path. The stack is
//! local to the call stack, so concurrent resolutions on other threads
//! never interfere. This also covers manual factories, whose
//! dependencies are not declared and therefore invisible to the
//! build-time graph.

use std::cell::RefCell;

use crate::error::{DiError, DiResult};
use crate::key::Key;

const MAX_DEPTH: usize = 1024;

thread_local! {
    static RESOLUTION_STACK: RefCell<Vec<Key>> = const { RefCell::new(Vec::new()) };
}

/// Guard holding one entry of the thread-local resolution stack.
///
/// Entering a key already on the stack fails with [`DiError::Circular`];
/// the guard pops its entry on drop, including during error unwinding.
#[derive(Debug)]
pub(crate) struct ResolutionFrame {
    key: Key,
}

impl ResolutionFrame {
    pub(crate) fn enter(key: Key) -> DiResult<Self> {
        RESOLUTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().position(|k| *k == key) {
                let mut path: Vec<Key> = stack[pos..].to_vec();
                path.push(key);
                return Err(DiError::Circular { path });
            }
            if stack.len() >= MAX_DEPTH {
                return Err(DiError::DepthExceeded(stack.len()));
            }
            stack.push(key);
            Ok(())
        })?;
        Ok(Self { key })
    }
}

impl Drop for ResolutionFrame {
    fn drop(&mut self) {
        RESOLUTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let popped = stack.pop();
            debug_assert_eq!(popped, Some(self.key));
        });
    }
}
