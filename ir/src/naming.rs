use std::collections::HashMap;

/// Allocates unique, readable names for nodes created by a pass.
///
/// Names are `prefix_N` with a counter per prefix. The allocator is threaded explicitly
/// through passes; [`NameAlloc::reset`] restarts numbering for the next pass.
#[derive(Debug, Clone, Default)]
pub struct NameAlloc {
    counters: HashMap<String, usize>,
}

impl NameAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, prefix: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        let name = format!("{prefix}_{counter}");
        *counter += 1;
        name
    }

    pub fn reset(&mut self) {
        self.counters.clear();
    }
}
