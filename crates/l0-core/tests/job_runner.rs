mod support;

use std::sync::{Arc, Mutex};

use serde::Serialize;

use l0_core::id::SequenceIdGenerator;
use l0_core::job::{
    Job, JobError, JobOutcome, JobRunner, JobStatus, JobStore, JobType, MemoryJobStore,
    UpdateRequest, Worker,
};
use l0_core::models::{
    CreateDeployRequest, CreateEnvironmentRequest, CreateLoadBalancerRequest,
    CreateServiceRequest, CreateTaskRequest, Dockerrun, EnvironmentLinkRequest,
    UpdateServiceRequest,
};
use l0_core::remote::{ContainerDefinition, PortMapping};
use l0_core::scaler::ScaleScheduler;
use l0_core::tag::TagStore;
use l0_core::types::EntityType;

use support::Harness;

#[derive(Default)]
struct RecordingScheduler {
    requests: Mutex<Vec<String>>,
}

impl RecordingScheduler {
    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl ScaleScheduler for RecordingScheduler {
    fn schedule_run(&self, environment_id: &str) {
        self.requests
            .lock()
            .unwrap()
            .push(environment_id.to_string());
    }
}

struct Fixture {
    h: Harness,
    scheduler: Arc<RecordingScheduler>,
    jobs: Arc<MemoryJobStore>,
    worker: Worker,
}

impl Fixture {
    fn new(entity_ids: &[&str]) -> Self {
        let h = Harness::new(entity_ids.to_vec());
        let scheduler = Arc::new(RecordingScheduler::default());
        let runner = Arc::new(JobRunner::new(
            h.providers.clone(),
            h.context.store.clone(),
            scheduler.clone(),
        ));
        let jobs = Arc::new(MemoryJobStore::new(Arc::new(
            SequenceIdGenerator::new(Vec::<String>::new()).with_fallback("job"),
        )));
        let worker = Worker::new(jobs.clone(), runner);
        Self {
            h,
            scheduler,
            jobs,
            worker,
        }
    }

    fn submit(&self, job_type: JobType, request: &impl Serialize) -> String {
        let request = serde_json::to_string(request).unwrap();
        self.jobs.insert(job_type, &request).unwrap()
    }

    /// Runs one job and returns what it produced.
    fn run(&self, job_type: JobType, request: &impl Serialize) -> Option<String> {
        let job_id = self.submit(job_type, request);
        match self.worker.process(&job_id).unwrap() {
            JobOutcome::Completed { result } => result,
            other => panic!("{job_type} did not complete: {other:?}"),
        }
    }

    /// Deletes take the bare entity ID as their request.
    fn run_delete(&self, job_type: JobType, entity_id: &str) -> JobOutcome {
        let job_id = self.jobs.insert(job_type, entity_id).unwrap();
        self.worker.process(&job_id).unwrap()
    }

    fn environment(&self, name: &str) -> String {
        self.run(JobType::CreateEnvironment, &CreateEnvironmentRequest::new(name))
            .unwrap()
    }

    fn deploy(&self) -> String {
        self.run(
            JobType::CreateDeploy,
            &CreateDeployRequest {
                deploy_name: "web".to_string(),
                dockerrun: Dockerrun {
                    container_definitions: vec![ContainerDefinition {
                        name: "web".to_string(),
                        image: "nginx".to_string(),
                        port_mappings: vec![PortMapping {
                            host_port: 80,
                            container_port: 80,
                            protocol: None,
                        }],
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            },
        )
        .unwrap()
    }
}

#[test]
fn create_jobs_record_their_results() {
    let f = Fixture::new(&["e1"]);
    let job_id = f.submit(JobType::CreateEnvironment, &CreateEnvironmentRequest::new("prod"));

    let outcome = f.worker.process(&job_id).unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Completed {
            result: Some("e1".to_string())
        }
    );
    let job = f.jobs.select_by_id(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result.as_deref(), Some("e1"));
    assert_eq!(job.error, None);
}

#[test]
fn service_changes_request_a_scaling_pass() {
    let f = Fixture::new(&["e1", "svc1"]);
    f.environment("prod");
    let deploy_id = f.deploy();

    let service_id = f
        .run(
            JobType::CreateService,
            &CreateServiceRequest {
                service_name: "web".to_string(),
                environment_id: "e1".to_string(),
                deploy_id,
                load_balancer_id: None,
                scale: 1,
            },
        )
        .unwrap();
    assert_eq!(f.scheduler.requests(), vec!["e1"]);

    f.run(
        JobType::UpdateService,
        &UpdateRequest {
            entity_id: service_id.clone(),
            update: UpdateServiceRequest {
                deploy_id: None,
                scale: Some(4),
            },
        },
    );
    assert_eq!(f.scheduler.requests(), vec!["e1", "e1"]);

    let outcome = f.run_delete(JobType::DeleteService, &service_id);
    assert_eq!(outcome, JobOutcome::Completed { result: None });
    assert_eq!(f.scheduler.requests(), vec!["e1", "e1", "e1"]);
}

#[test]
fn task_jobs_request_scaling_around_the_task() {
    let f = Fixture::new(&["e1", "t1"]);
    f.environment("prod");
    let deploy_id = f.deploy();

    let task_id = f
        .run(
            JobType::CreateTask,
            &CreateTaskRequest {
                task_name: "once".to_string(),
                environment_id: "e1".to_string(),
                deploy_id,
                container_overrides: Vec::new(),
            },
        )
        .unwrap();
    assert_eq!(task_id, "t1");
    assert_eq!(f.scheduler.requests(), vec!["e1"]);

    f.run_delete(JobType::DeleteTask, &task_id);
    assert_eq!(f.scheduler.requests(), vec!["e1", "e1"]);
}

#[test]
fn deleting_an_environment_removes_its_members_first() {
    let f = Fixture::new(&["e1", "lb1", "svc1", "t1"]);
    f.environment("prod");
    let deploy_id = f.deploy();
    f.run(
        JobType::CreateLoadBalancer,
        &CreateLoadBalancerRequest {
            load_balancer_name: "web".to_string(),
            environment_id: "e1".to_string(),
            is_public: true,
            ports: Vec::new(),
            health_check: None,
        },
    );
    f.run(
        JobType::CreateService,
        &CreateServiceRequest {
            service_name: "web".to_string(),
            environment_id: "e1".to_string(),
            deploy_id: deploy_id.clone(),
            load_balancer_id: Some("lb1".to_string()),
            scale: 1,
        },
    );
    f.run(
        JobType::CreateTask,
        &CreateTaskRequest {
            task_name: "once".to_string(),
            environment_id: "e1".to_string(),
            deploy_id: deploy_id.clone(),
            container_overrides: Vec::new(),
        },
    );

    let outcome = f.run_delete(JobType::DeleteEnvironment, "e1");
    assert_eq!(outcome, JobOutcome::Completed { result: None });

    for entity_type in [
        EntityType::Environment,
        EntityType::LoadBalancer,
        EntityType::Service,
        EntityType::Task,
    ] {
        assert!(
            f.h.store.select_by_type(entity_type).unwrap().is_empty(),
            "{entity_type} tags left behind"
        );
    }
    assert!(!f.h.cloud.has_cluster(&f.h.fq("e1")));
    assert!(f.h.cloud.load_balancer(&f.h.fq("lb1")).is_none());
    // deploys do not belong to an environment
    assert!(
        !f.h
            .store
            .select_by_type_and_id(EntityType::Deploy, &deploy_id)
            .unwrap()
            .is_empty()
    );

    let call_order: Vec<String> = f
        .h
        .cloud
        .calls()
        .into_iter()
        .filter(|op| {
            ["delete_service", "stop_task", "delete_load_balancer", "delete_cluster"]
                .contains(&op.as_str())
        })
        .collect();
    assert_eq!(
        call_order,
        vec!["delete_service", "stop_task", "delete_load_balancer", "delete_cluster"]
    );
}

#[test]
fn link_jobs_connect_environments() {
    let f = Fixture::new(&["a", "b"]);
    f.environment("alpha");
    f.environment("beta");
    let link = EnvironmentLinkRequest {
        source_environment_id: "a".to_string(),
        dest_environment_id: "b".to_string(),
    };

    f.run(JobType::CreateEnvironmentLink, &link);
    assert_eq!(f.h.providers.environment.read("b").unwrap().links, vec!["a"]);

    f.run(JobType::DeleteEnvironmentLink, &link);
    assert!(f.h.providers.environment.read("b").unwrap().links.is_empty());
}

#[test]
fn malformed_requests_fail_the_job() {
    let f = Fixture::new(&[]);
    let job_id = f.jobs.insert(JobType::CreateService, "{not json").unwrap();

    match f.worker.process(&job_id).unwrap() {
        JobOutcome::Failed { error } => {
            assert!(error.starts_with("malformed create_service request"), "{error}")
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let job = f.jobs.select_by_id(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.is_some());
    assert!(f.scheduler.requests().is_empty());

    assert_eq!(f.worker.process(&job_id).unwrap(), JobOutcome::Skipped);
}

#[test]
fn provider_errors_are_recorded() {
    let f = Fixture::new(&["e1"]);
    f.environment("prod");

    let runner = JobRunner::new(
        f.h.providers.clone(),
        f.h.context.store.clone(),
        f.scheduler.clone(),
    );
    let err = runner
        .run(&Job::new("direct", JobType::UpdateEnvironment, "[]"))
        .unwrap_err();
    assert!(matches!(err, JobError::Request { .. }));

    let job_id = f.submit(
        JobType::CreateService,
        &CreateServiceRequest {
            service_name: "web".to_string(),
            environment_id: "e1".to_string(),
            deploy_id: "ghost.1".to_string(),
            load_balancer_id: None,
            scale: 1,
        },
    );
    match f.worker.process(&job_id).unwrap() {
        JobOutcome::Failed { error } => assert!(error.contains("ghost.1"), "{error}"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(f.scheduler.requests().is_empty());
}

#[test]
fn drain_runs_pending_jobs_in_order() {
    let f = Fixture::new(&["e1", "e2"]);
    let first = f.submit(JobType::CreateEnvironment, &CreateEnvironmentRequest::new("one"));
    let second = f.submit(JobType::CreateEnvironment, &CreateEnvironmentRequest::new("two"));
    let bad = f.submit(JobType::CreateEnvironment, &"nope");

    let outcomes = f.worker.drain().unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(
        outcomes[0],
        (
            first,
            JobOutcome::Completed {
                result: Some("e1".to_string())
            }
        )
    );
    assert_eq!(
        outcomes[1],
        (
            second,
            JobOutcome::Completed {
                result: Some("e2".to_string())
            }
        )
    );
    assert_eq!(outcomes[2].0, bad);
    assert!(matches!(outcomes[2].1, JobOutcome::Failed { .. }));

    assert!(f.worker.drain().unwrap().is_empty());
}
