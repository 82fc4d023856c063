use serde::{Deserialize, Deserializer, Serialize};

/// Ordered list of concept strings that always holds at least one element.
///
/// Empty strings are allowed while the user is typing; they are filtered out
/// only when a generation request is validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConceptList(Vec<String>);

impl ConceptList {
    pub fn new() -> Self {
        Self(vec![String::new()])
    }

    pub fn from_vec(concepts: Vec<String>) -> Self {
        if concepts.is_empty() {
            Self::new()
        } else {
            Self(concepts)
        }
    }

    /// Append one empty concept
    pub fn add(&mut self) {
        self.0.push(String::new());
    }

    /// Remove the concept at `index`; removing the last remaining element is a no-op.
    /// Returns whether anything was removed.
    pub fn remove(&mut self, index: usize) -> bool {
        if self.0.len() <= 1 || index >= self.0.len() {
            return false;
        }
        self.0.remove(index);
        true
    }

    /// Replace the concept at `index` in place, verbatim
    pub fn update(&mut self, index: usize, value: impl Into<String>) -> bool {
        match self.0.get_mut(index) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for `len` symmetry
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Concepts with content, trimmed
    pub fn non_empty(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|c| c.trim()).filter(|c| !c.is_empty())
    }
}

impl Default for ConceptList {
    fn default() -> Self {
        Self::new()
    }
}

impl<'de> Deserialize<'de> for ConceptList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<String>::deserialize(deserializer).map(ConceptList::from_vec)
    }
}
