use std::fmt;

/// Position of one schema within a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub index: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(index: usize, total: usize) -> Self {
        Self { index, total }
    }

    pub fn percent(&self) -> usize {
        if self.total == 0 {
            return 100;
        }
        self.index * 100 / self.total
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{} ({}%)]", self.index, self.total, self.percent())
    }
}

/// Lifecycle of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Progress::new(3, 10).to_string(), "[3/10 (30%)]");
        assert_eq!(Progress::new(1, 3).to_string(), "[1/3 (33%)]");
        assert_eq!(Progress::new(0, 0).percent(), 100);
    }
}
