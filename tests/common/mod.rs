#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Aborts the test process if dropped later than `duration` after creation.
///
/// A deadlocked pipeline never returns, so a plain assertion would hang CI.
pub struct TestTimeoutGuard {
    cancelled: Arc<AtomicBool>,
}

impl Drop for TestTimeoutGuard {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

pub fn test_timeout_guard(duration: Duration) -> TestTimeoutGuard {
    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_clone = Arc::clone(&cancelled);
    std::thread::spawn(move || {
        std::thread::sleep(duration);
        if !cancelled_clone.load(Ordering::SeqCst) {
            eprintln!("Test timeout exceeded ({}s). Aborting.", duration.as_secs());
            std::process::abort();
        }
    });
    TestTimeoutGuard { cancelled }
}

/// Deterministic input mixing plain text, newlines and runs of stars
pub fn mixed_input(len: usize) -> Vec<u8> {
    const ALPHABET: &[u8] = b"abc*de\n**f*gh\n***ij";
    let mut state: u32 = 0x2545_F491;
    (0..len)
        .map(|_| {
            // xorshift32
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            ALPHABET[state as usize % ALPHABET.len()]
        })
        .collect()
}

/// Straight-line model of the transformation, before chunking
pub fn reference_transform(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut iter = input.iter().map(|&b| if b == b'\n' { b' ' } else { b });
    while let Some(first) = iter.next() {
        if first != b'*' {
            out.push(first);
            continue;
        }
        match iter.next() {
            Some(b'*') => out.push(b'^'),
            Some(second) => out.extend([first, second]),
            None => out.push(first),
        }
    }
    out
}
