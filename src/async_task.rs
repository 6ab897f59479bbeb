use std::sync::Arc;
use tokio::sync::mpsc;

use crate::loader::DirectoryLoader;
use crate::navigator::{LoadCompletion, LoadRequest};

#[derive(Debug, Clone)]
pub enum Task {
    ResolveDirectory(LoadRequest),
}

#[derive(Debug, Clone)]
pub enum TaskResult {
    DirectoryResolved(LoadCompletion),
}

/// Run load tasks until the sending side goes away.
///
/// Each request gets its own task, so a slow resolver never holds up the
/// next request; the loader's single-flight table merges requests for the
/// same directory.
pub async fn run_worker(
    mut task_receiver: mpsc::Receiver<Task>,
    result_sender: mpsc::Sender<TaskResult>,
    loader: Arc<DirectoryLoader>,
) {
    while let Some(task) = task_receiver.recv().await {
        match task {
            Task::ResolveDirectory(request) => {
                log::debug!("worker: resolving {} (request {})", request.key, request.id);
                let loader = loader.clone();
                let result_sender = result_sender.clone();
                tokio::spawn(async move {
                    let report = loader
                        .load_directory(&request.key, &request.resolver, request.options)
                        .await;
                    let result = TaskResult::DirectoryResolved(LoadCompletion::from_report(request.id, report));
                    if result_sender.send(result).await.is_err() {
                        log::debug!("worker: receiver dropped before request {} finished", request.id);
                    }
                });
            }
        }
    }
    log::debug!("worker: task channel closed");
}
