use std::collections::VecDeque;

/// Low-priority work deferred until the event loop has nothing more urgent
/// to do. The owner decides when "idle" is; this only keeps the order.
#[derive(Debug)]
pub struct IdleQueue<T> {
    jobs: VecDeque<T>,
}

impl<T> IdleQueue<T> {
    pub fn new() -> Self {
        Self {
            jobs: VecDeque::new(),
        }
    }

    pub fn schedule(&mut self, job: T) {
        self.jobs.push_back(job);
    }

    pub fn schedule_all(&mut self, jobs: impl IntoIterator<Item = T>) {
        self.jobs.extend(jobs);
    }

    pub fn drain(&mut self) -> Vec<T> {
        self.jobs.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}

impl<T> Default for IdleQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
