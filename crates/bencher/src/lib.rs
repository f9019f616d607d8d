//! Shared fixtures for the cache entry benchmarks.

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    shape: EntryShape,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, shape: EntryShape) -> Self {
        Self { name, group, shape }
    }

    pub fn small(name: &'static str, shape: EntryShape) -> Self {
        Self::new(name, TestGroup::Small, shape)
    }

    pub fn normal(name: &'static str, shape: EntryShape) -> Self {
        Self::new(name, TestGroup::Normal, shape)
    }

    pub fn large(name: &'static str, shape: EntryShape) -> Self {
        Self::new(name, TestGroup::Large, shape)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn shape(&self) -> &EntryShape {
        &self.shape
    }
}

/// Layout of a synthetic cache entry: body segment lengths and response headers.
#[derive(Debug, Copy, Clone)]
pub struct EntryShape {
    segments: &'static [usize],
    headers: &'static [(&'static str, &'static str)],
}

impl EntryShape {
    pub const fn new(segments: &'static [usize], headers: &'static [(&'static str, &'static str)]) -> Self {
        Self { segments, headers }
    }

    pub fn segments(&self) -> &'static [usize] {
        self.segments
    }

    pub fn headers(&self) -> &'static [(&'static str, &'static str)] {
        self.headers
    }

    pub fn body_len(&self) -> usize {
        self.segments.iter().sum()
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}
