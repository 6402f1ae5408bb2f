use async_trait::async_trait;

/// A task which performs no suspending work and can run
/// directly on the calling thread, e.g. config parsing
/// or request mutation
pub trait BlockingTask<C: Send + Sync, E>: Send + Sync {
    fn run(&self, context: &C) -> Result<(), E>;
}

/// A task which may suspend, e.g. network io or channel ops
#[async_trait]
pub trait AsyncTask<C: Send + Sync, E>: Send + Sync {
    async fn run(&self, context: &C) -> Result<(), E>;
}

enum Task<C: Send + Sync, E> {
    Blocking(Box<dyn BlockingTask<C, E>>),
    Async(Box<dyn AsyncTask<C, E>>),
}

/// An ordered list of tasks which all share a single context
/// object. Tasks run one at a time in registration order, and
/// the first task to return an error aborts the remainder of
/// the pipeline.
///
/// # Behavior
/// Tasks communicate only through the shared context, which
/// they receive by reference and mutate through interior
/// mutability. An aborted pipeline is not an exceptional
/// outcome, e.g. a request validation task may attach a nobid
/// state and abort the rest of the auction flow.
pub struct Pipeline<C: Send + Sync, E> {
    tasks: Vec<Task<C, E>>,
}

impl<C: Send + Sync, E> Pipeline<C, E> {
    /// Runs every task in order until completion or the
    /// first error, which is returned as-is
    pub async fn run(&self, context: &C) -> Result<(), E> {
        for task in &self.tasks {
            match task {
                Task::Blocking(task) => task.run(context)?,
                Task::Async(task) => task.run(context).await?,
            }
        }

        Ok(())
    }
}

/// Builder to assemble a [`Pipeline`] from blocking and async tasks
pub struct PipelineBuilder<C: Send + Sync, E> {
    tasks: Vec<Task<C, E>>,
}

impl<C: Send + Sync, E> PipelineBuilder<C, E> {
    pub fn new() -> Self {
        PipelineBuilder { tasks: Vec::new() }
    }

    pub fn with_blocking(mut self, task: Box<dyn BlockingTask<C, E>>) -> Self {
        self.tasks.push(Task::Blocking(task));
        self
    }

    pub fn with_async(mut self, task: Box<dyn AsyncTask<C, E>>) -> Self {
        self.tasks.push(Task::Async(task));
        self
    }

    /// Non-consuming variant for conditional task registration
    pub fn add_blocking(&mut self, task: Box<dyn BlockingTask<C, E>>) -> &mut Self {
        self.tasks.push(Task::Blocking(task));
        self
    }

    /// Non-consuming variant for conditional task registration
    pub fn add_async(&mut self, task: Box<dyn AsyncTask<C, E>>) -> &mut Self {
        self.tasks.push(Task::Async(task));
        self
    }

    /// Returns the built pipeline, or None if no tasks were registered
    pub fn build(self) -> Option<Pipeline<C, E>> {
        if self.tasks.is_empty() {
            return None;
        }

        Some(Pipeline { tasks: self.tasks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Error, bail};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        calls: AtomicUsize,
    }

    struct IncrementTask;

    impl BlockingTask<Counter, Error> for IncrementTask {
        fn run(&self, context: &Counter) -> Result<(), Error> {
            context.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailTask;

    impl BlockingTask<Counter, Error> for FailTask {
        fn run(&self, _context: &Counter) -> Result<(), Error> {
            bail!("boom")
        }
    }

    struct AsyncIncrementTask;

    #[async_trait]
    impl AsyncTask<Counter, Error> for AsyncIncrementTask {
        async fn run(&self, context: &Counter) -> Result<(), Error> {
            context.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_empty_builder_returns_none() {
        let pipeline: Option<Pipeline<Counter, Error>> = PipelineBuilder::new().build();
        assert!(pipeline.is_none());
    }

    #[tokio::test]
    async fn test_tasks_run_in_order() {
        let pipeline = PipelineBuilder::new()
            .with_blocking(Box::new(IncrementTask))
            .with_async(Box::new(AsyncIncrementTask))
            .with_blocking(Box::new(IncrementTask))
            .build()
            .unwrap();

        let context = Counter {
            calls: AtomicUsize::new(0),
        };

        pipeline.run(&context).await.unwrap();

        assert_eq!(context.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_error_aborts_remaining_tasks() {
        let pipeline = PipelineBuilder::new()
            .with_blocking(Box::new(IncrementTask))
            .with_blocking(Box::new(FailTask))
            .with_blocking(Box::new(IncrementTask))
            .build()
            .unwrap();

        let context = Counter {
            calls: AtomicUsize::new(0),
        };

        let result = pipeline.run(&context).await;

        assert!(result.is_err());
        assert_eq!(context.calls.load(Ordering::SeqCst), 1);
    }
}
