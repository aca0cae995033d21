use crate::report::TestReporter;

use super::batch::GameTestBatch;
use super::info::GameTestInfo;
use super::tracker::TestInstanceId;

pub struct ListenerContext<'a> {
    reruns: &'a mut Vec<TestInstanceId>,
    reporter: &'a mut dyn TestReporter,
}

impl<'a> ListenerContext<'a> {
    pub(crate) fn new(
        reruns: &'a mut Vec<TestInstanceId>,
        reporter: &'a mut dyn TestReporter,
    ) -> Self {
        Self { reruns, reporter }
    }

    pub fn rerun(&mut self, id: TestInstanceId) {
        if !self.reruns.contains(&id) {
            self.reruns.push(id);
        }
    }

    pub fn reporter(&mut self) -> &mut dyn TestReporter {
        &mut *self.reporter
    }
}

pub trait GameTestListener {
    fn test_structure_loaded(&mut self, _id: TestInstanceId, _info: &GameTestInfo) {}

    fn test_passed(
        &mut self,
        _id: TestInstanceId,
        _info: &GameTestInfo,
        _context: &mut ListenerContext<'_>,
    ) {
    }

    fn test_failed(
        &mut self,
        _id: TestInstanceId,
        _info: &GameTestInfo,
        _context: &mut ListenerContext<'_>,
    ) {
    }

    fn test_added_for_rerun(
        &mut self,
        _original: TestInstanceId,
        _rerun: TestInstanceId,
        _info: &GameTestInfo,
    ) {
    }
}

pub trait GameTestBatchListener {
    fn test_batch_starting(&mut self, _batch: &GameTestBatch) {}

    fn test_batch_finished(&mut self, _batch: &GameTestBatch) {}
}
