//! Pass/fail aggregation over nested test results and failure-message parsing.

use std::ops::AddAssign;

use fcs_types::TestResultRecord;

const RESULT_TOKEN: &str = "( Result= ";
const EXPECTED_TOKEN: &str = ", Expected= ";

/// Pass/fail counts over leaf results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub ok: usize,
    pub fail: usize,
}

impl Tally {
    #[must_use]
    pub fn leaf(is_ok: bool) -> Self {
        if is_ok {
            Self { ok: 1, fail: 0 }
        } else {
            Self { ok: 0, fail: 1 }
        }
    }

    #[must_use]
    pub fn total(self) -> usize {
        self.ok + self.fail
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, other: Self) {
        self.ok += other.ok;
        self.fail += other.fail;
    }
}

/// Count the leaves under `record` (or `record` itself when it is a leaf).
///
/// Groups contribute nothing of their own, whatever their `is_ok` says.
#[must_use]
pub fn tally(record: &TestResultRecord) -> Tally {
    if record.is_leaf() {
        return Tally::leaf(record.is_ok);
    }
    let mut total = Tally::default();
    for item in &record.items {
        total += tally(item);
    }
    total
}

/// A failed equality assertion, as extracted from its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub result: String,
    pub expectation: String,
}

/// Extract `<R>` and `<E>` from `... ( Result= <R>, Expected= <E> )`.
///
/// Anything that does not have exactly that shape yields `None`.
#[must_use]
pub fn parse_failure_message(message: &str) -> Option<Mismatch> {
    let start = message.find(RESULT_TOKEN)? + RESULT_TOKEN.len();
    let rest = &message[start..];
    let split = rest.find(EXPECTED_TOKEN)?;
    let result = &rest[..split];
    let expectation = rest[split + EXPECTED_TOKEN.len()..]
        .trim_end()
        .strip_suffix(')')?;

    Some(Mismatch {
        result: result.trim().to_string(),
        expectation: expectation.trim().to_string(),
    })
}

/// Summary line shown on a test root.
#[must_use]
pub fn summary_text(tally: Tally) -> String {
    if tally.is_empty() {
        "Empty test group".to_string()
    } else {
        format!(
            "Total evaluated tests {}, Succeeded {}, Failed {}",
            tally.total(),
            tally.ok,
            tally.fail
        )
    }
}
