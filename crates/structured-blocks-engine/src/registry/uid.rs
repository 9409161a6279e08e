use crate::models::Uid;

/// Source of fresh block identifiers, injected into the registry.
pub trait UidSource {
    fn next_uid(&mut self) -> Uid;
}

/// Random 128-bit identifiers (UUID v4, simple hex form)
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomUids;

impl UidSource for RandomUids {
    fn next_uid(&mut self) -> Uid {
        Uid::new(uuid::Uuid::new_v4().simple().to_string())
    }
}

/// Deterministic identifiers (`<prefix>1`, `<prefix>2`, ...) for tests and
/// reproducible fixtures. Uniqueness against live blocks is still checked by
/// the registry when the document assigns identifiers.
#[derive(Debug, Clone)]
pub struct SequentialUids {
    prefix: String,
    next: u64,
}

impl SequentialUids {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl UidSource for SequentialUids {
    fn next_uid(&mut self) -> Uid {
        let uid = Uid::new(format!("{}{}", self.prefix, self.next));
        self.next += 1;
        uid
    }
}
