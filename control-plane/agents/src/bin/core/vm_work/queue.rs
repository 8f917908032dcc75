use super::{execute, VmWork};
use crate::controller::registry::Registry;
use agents::errors::SvcError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use std::collections::HashMap;
use stor_port::{
    transport_api::ErrorChain,
    types::v0::{
        store::{
            definitions::{ObjectKey, StorableObject},
            vm_work::{JobStatus, VmWorkJob},
        },
        transport::{JobId, NodeId, VmId},
    },
};

tokio::task_local! {
    /// The vm whose work job the current task is running.
    static VM_WORK_CONTEXT: VmId;
}

/// Check if the current task is running a work job of the given vm.
pub(crate) fn in_vm_work(vm: &VmId) -> bool {
    VM_WORK_CONTEXT
        .try_with(|current| current == vm)
        .unwrap_or(false)
}

type Outcome = Result<serde_json::Value, SvcError>;

/// Queue of vm work jobs.
/// Holds the outcome of the jobs run by this node until their submitter collects it.
#[derive(Debug, Default)]
pub(crate) struct VmWorkQueue {
    outcomes: Mutex<HashMap<JobId, Outcome>>,
}

impl VmWorkQueue {
    /// Run the work for the vm: inline when already running within a job of the same vm,
    /// otherwise as a queued job which is polled until it completes.
    pub(crate) async fn run<T: DeserializeOwned>(
        registry: &Registry,
        vm: &VmId,
        work: VmWork,
    ) -> Result<T, SvcError> {
        let value = if in_vm_work(vm) {
            tracing::debug!(vm.id = %vm, handler = work.handler(), "Running vm work inline");
            execute(registry, work).await?
        } else {
            let job = Self::submit(registry, vm, work).await?;
            Self::wait(registry, &job).await?
        };
        serde_json::from_value(value).context(agents::errors::Serde {
            what: "vm work result",
        })
    }

    /// Persist the job and spawn its execution.
    async fn submit(registry: &Registry, vm: &VmId, work: VmWork) -> Result<JobId, SvcError> {
        let payload = serde_json::to_value(&work).context(agents::errors::Serde {
            what: "vm work payload",
        })?;
        let job = VmWorkJob {
            id: JobId::new(),
            vm: vm.clone(),
            dispatcher: work.dispatcher().to_string(),
            handler: work.handler().to_string(),
            payload,
            status: JobStatus::InProgress,
            result: None,
            error: None,
            owner: registry.node_id().clone(),
            created: chrono::Utc::now(),
        };
        registry.store_obj(&job).await?;
        registry.specs().insert_job(job.clone());
        tracing::info!(
            job.id = %job.id,
            vm.id = %vm,
            handler = %job.handler,
            "Queued vm work job"
        );

        let job_id = job.id.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            Self::run_job(registry, job, work).await;
        });
        Ok(job_id)
    }

    /// Execute the job under the vm lock and record its outcome.
    async fn run_job(registry: Registry, job: VmWorkJob, work: VmWork) {
        let timeout = registry.config().lock_timeout;
        let outcome = match registry.vm_locks().lock(&job.vm, timeout).await {
            Ok(_guard) => {
                VM_WORK_CONTEXT
                    .scope(job.vm.clone(), execute(&registry, work))
                    .await
            }
            Err(error) => Err(error),
        };

        let (status, result, error) = match &outcome {
            Ok(value) => (JobStatus::Succeeded, Some(value.clone()), None),
            Err(error) => (JobStatus::Failed, None, Some(error.full_string())),
        };
        // the outcome must be available before the job is seen as completed
        registry
            .vm_work()
            .outcomes
            .lock()
            .insert(job.id.clone(), outcome);

        let completed = VmWorkJob {
            status,
            result,
            error,
            ..job
        };
        if let Err(error) = registry.store_obj(&completed).await {
            tracing::error!(
                job.id = %completed.id,
                error = error.full_string(),
                "Failed to persist the vm work job outcome"
            );
        }
        tracing::info!(
            job.id = %completed.id,
            status = %completed.status,
            "Completed vm work job"
        );
        registry.specs().insert_job(completed);
    }

    /// Poll the job until it completes, then collect its outcome.
    async fn wait(registry: &Registry, job_id: &JobId) -> Outcome {
        let period = registry.config().job_poll_period;
        let job = loop {
            let job = registry.specs().job_rsc(job_id)?.lock().clone();
            if job.completed() {
                break job;
            }
            tokio::time::sleep(period).await;
        };

        let outcome = registry.vm_work().outcomes.lock().remove(job_id);
        if let Err(error) = registry.delete_kv(&job.key().key()).await {
            tracing::warn!(
                job.id = %job.id,
                error = error.full_string(),
                "Failed to delete the vm work job"
            );
        }
        registry.specs().remove_job(job_id);

        match outcome {
            Some(outcome) => outcome,
            None => match job.status {
                JobStatus::Succeeded => Ok(job.result.unwrap_or_default()),
                _ => Err(SvcError::JobFailed {
                    job: job.id.to_string(),
                    reason: job.error.unwrap_or_default(),
                }),
            },
        }
    }
}

/// Fail the in-progress jobs owned by a control-plane node which is gone, as nothing will
/// ever complete them.
pub(crate) async fn fail_orphaned_jobs(
    registry: &Registry,
    owner: &NodeId,
) -> Result<(), SvcError> {
    for job in registry.specs().jobs() {
        if &job.owner != owner || job.completed() {
            continue;
        }
        tracing::warn!(
            job.id = %job.id,
            vm.id = %job.vm,
            node.id = %owner,
            "Failing orphaned vm work job"
        );
        let failed = VmWorkJob {
            status: JobStatus::Failed,
            error: Some(format!("owner control-plane node '{owner}' departed")),
            ..job
        };
        registry.store_obj(&failed).await?;
        registry.specs().insert_job(failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{in_vm_work, VmWorkQueue, VM_WORK_CONTEXT};
    use crate::{
        tests::{Fixture, RUNNING_VM},
        vm_work::VmWork,
    };
    use std::time::Duration;
    use stor_port::types::v0::{
        store::vm::VmInstance,
        transport::{VmId, VmState},
    };

    #[tokio::test]
    async fn nested_work_runs_inline() {
        let fixture = Fixture::new(vec![]).await;
        let registry = &fixture.registry;
        let vm = VmId::from(RUNNING_VM);
        assert!(!in_vm_work(&vm));

        // as held by the job which is already running for the vm
        let _guard = registry
            .vm_locks()
            .lock(&vm, Duration::from_secs(1))
            .await
            .unwrap();
        let stopped = VM_WORK_CONTEXT
            .scope(vm.clone(), async {
                assert!(in_vm_work(&vm));
                assert!(!in_vm_work(&VmId::from("other")));
                let work = VmWork::StopVm {
                    vm: vm.clone(),
                    forced: false,
                };
                VmWorkQueue::run::<VmInstance>(registry, &vm, work).await
            })
            .await
            .unwrap();
        assert_eq!(stopped.state, VmState::Stopped);
        assert!(registry.specs().jobs().is_empty());
        assert_eq!(fixture.transport.sent("StopVm").len(), 1);
    }
}
