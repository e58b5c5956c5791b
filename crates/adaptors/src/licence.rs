//! Licences a requester must have accepted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A licence identifier at a given revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Licence {
    pub id: String,
    pub revision: u32,
}

impl Licence {
    pub fn new(id: impl Into<String>, revision: u32) -> Self {
        Self {
            id: id.into(),
            revision,
        }
    }
}

impl fmt::Display for Licence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.revision)
    }
}

/// Collection licences plus those of every selected model, sorted and
/// without duplicates.
pub fn resolve<S: AsRef<str>>(
    collection: &[Licence],
    per_model: &BTreeMap<String, Vec<Licence>>,
    models: &[S],
) -> Vec<Licence> {
    let mut licences: BTreeSet<Licence> = collection.iter().cloned().collect();
    for model in models {
        if let Some(extra) = per_model.get(model.as_ref()) {
            licences.extend(extra.iter().cloned());
        }
    }
    licences.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_sorted_and_deduplicated() {
        let collection = vec![Licence::new("cc-by", 1)];
        let per_model = BTreeMap::from([
            ("silam".to_string(), vec![Licence::new("fmi-data", 2), Licence::new("cc-by", 1)]),
            ("ensemble".to_string(), vec![Licence::new("atmosphere", 3)]),
        ]);

        let licences = resolve(&collection, &per_model, &["silam", "chimere"]);
        assert_eq!(licences, vec![Licence::new("cc-by", 1), Licence::new("fmi-data", 2)]);
        assert_eq!(licences[1].to_string(), "fmi-data@2");
    }
}
