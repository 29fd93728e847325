mod support;

use std::sync::Arc;

use l0_core::id::SequenceIdGenerator;
use l0_core::job::{JobStatus, JobStore, JobType, MemoryJobStore};
use l0_core::models::{
    CreateDeployRequest, CreateEnvironmentRequest, CreateServiceRequest, CreateTaskRequest,
    Dockerrun, EnvironmentType, UpdateEnvironmentRequest,
};
use l0_core::remote::ContainerDefinition;
use l0_core::scaler::{EnvironmentScaler, ScalerError};

use support::{Harness, container_instance};

struct Fixture {
    h: Harness,
    jobs: Arc<MemoryJobStore>,
    scaler: EnvironmentScaler,
}

impl Fixture {
    /// A static environment `e1` created at `scale`, with its bounds then
    /// widened to `min..=max`.
    fn new(scale: i64, min: i64, max: i64) -> Self {
        let h = Harness::new(["e1", "svc1"]);
        h.providers
            .environment
            .create(&CreateEnvironmentRequest {
                scale,
                ..CreateEnvironmentRequest::new("prod")
            })
            .unwrap();
        h.providers
            .environment
            .update(
                "e1",
                &UpdateEnvironmentRequest {
                    min_scale: Some(min),
                    max_scale: Some(max),
                },
            )
            .unwrap();

        let jobs = Arc::new(MemoryJobStore::new(Arc::new(SequenceIdGenerator::new([
            "j1",
        ]))));
        let scaler =
            EnvironmentScaler::new(h.context.clone(), h.providers.environment.clone(), jobs.clone());
        Self { h, jobs, scaler }
    }

    fn deploy(&self, cpu: i64, memory: i64) -> String {
        self.h
            .providers
            .deploy
            .create(&CreateDeployRequest {
                deploy_name: "worker".to_string(),
                dockerrun: Dockerrun {
                    container_definitions: vec![ContainerDefinition {
                        name: "worker".to_string(),
                        image: "busybox".to_string(),
                        cpu: Some(cpu),
                        memory: Some(memory),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            })
            .unwrap()
    }

    fn service(&self, deploy_id: &str, scale: i64) {
        self.h
            .providers
            .service
            .create(&CreateServiceRequest {
                service_name: "worker".to_string(),
                environment_id: "e1".to_string(),
                deploy_id: deploy_id.to_string(),
                load_balancer_id: None,
                scale,
            })
            .unwrap();
    }

    fn group_size(&self) -> (i64, i64, i64) {
        let group = self.h.cloud.auto_scaling_group(&self.h.fq("e1")).unwrap();
        (group.min_size, group.desired_capacity, group.max_size)
    }
}

#[test]
fn pending_service_copies_open_new_instances() {
    let f = Fixture::new(1, 0, 5);
    f.h.cloud
        .add_container_instance(&f.h.fq("e1"), container_instance("i-1", 1024, 3840, 0));
    let deploy_id = f.deploy(1024, 512);
    f.service(&deploy_id, 2);

    let report = f.scaler.scale("e1").unwrap();
    assert_eq!(report.desired_scale, Some(2));
    assert!(report.terminated.is_empty());
    assert_eq!(f.group_size(), (0, 2, 5));
}

#[test]
fn running_service_copies_need_no_room() {
    let f = Fixture::new(1, 0, 5);
    f.h.cloud
        .add_container_instance(&f.h.fq("e1"), container_instance("i-1", 0, 3328, 2));
    let deploy_id = f.deploy(512, 256);
    f.service(&deploy_id, 2);
    f.h.cloud
        .set_service_counts(&f.h.fq("e1"), &f.h.fq("svc1"), 2, 0);

    let report = f.scaler.scale("e1").unwrap();
    assert_eq!(report.desired_scale, Some(1));
    assert_eq!(f.group_size(), (0, 1, 5));
}

#[test]
fn idle_instances_are_terminated_without_decrement() {
    let f = Fixture::new(2, 0, 2);
    let cluster = f.h.fq("e1");
    f.h.cloud
        .add_container_instance(&cluster, container_instance("i-1", 512, 2048, 1));
    f.h.cloud
        .add_container_instance(&cluster, container_instance("i-2", 1024, 3840, 0));

    let report = f.scaler.scale("e1").unwrap();
    assert_eq!(report.desired_scale, Some(1));
    assert_eq!(report.terminated, vec!["i-2".to_string()]);
    assert_eq!(f.h.cloud.terminated(), vec![("i-2".to_string(), false)]);
    assert_eq!(f.group_size(), (0, 1, 2));
}

#[test]
fn desired_capacity_outside_bounds_is_left_alone() {
    let f = Fixture::new(1, 1, 1);

    let report = f.scaler.scale("e1").unwrap();
    assert_eq!(report.desired_scale, Some(0));
    assert!(report.terminated.is_empty());
    assert_eq!(f.group_size(), (1, 1, 1));
}

#[test]
fn in_progress_task_jobs_count_as_consumers() {
    let f = Fixture::new(0, 0, 3);
    let deploy_id = f.deploy(512, 512);

    let request = serde_json::to_string(&CreateTaskRequest {
        task_name: "migrate".to_string(),
        environment_id: "e1".to_string(),
        deploy_id,
        container_overrides: Vec::new(),
    })
    .unwrap();
    let job_id = f.jobs.insert(JobType::CreateTask, &request).unwrap();

    // pending jobs are ignored
    assert_eq!(f.scaler.scale("e1").unwrap().desired_scale, Some(0));

    f.jobs.set_status(&job_id, JobStatus::InProgress).unwrap();
    assert_eq!(f.scaler.scale("e1").unwrap().desired_scale, Some(1));
    assert_eq!(f.group_size(), (0, 1, 3));
}

#[test]
fn oversized_consumers_are_reported_after_scaling() {
    let f = Fixture::new(1, 0, 5);
    let deploy_id = f.deploy(4096, 512);
    f.service(&deploy_id, 1);

    match f.scaler.scale("e1") {
        Err(ScalerError::IncompatibleConsumer { consumer_ids }) => {
            assert_eq!(consumer_ids.len(), 1);
            assert!(consumer_ids[0].ends_with("/worker"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(f.group_size(), (0, 0, 5));
}

#[test]
fn dynamic_environments_are_skipped() {
    let h = Harness::new(["d1"]);
    h.providers
        .environment
        .create(&CreateEnvironmentRequest {
            environment_type: EnvironmentType::Dynamic,
            ..CreateEnvironmentRequest::new("batch")
        })
        .unwrap();
    let scaler = EnvironmentScaler::new(
        h.context.clone(),
        h.providers.environment.clone(),
        Arc::new(MemoryJobStore::default()),
    );
    h.cloud.clear_calls();

    let report = scaler.scale("d1").unwrap();
    assert_eq!(report.desired_scale, None);
    assert_eq!(h.cloud.call_count("update_auto_scaling_group"), 0);
}
