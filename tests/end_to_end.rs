use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mapred::coordinator::ledger::TaskKind;
use mapred::coordinator::{CoordinatorConfig, RunningCoordinator};
use mapred::error::WorkerError;
use mapred::rpc::{self, DoneRequest, StatusRequest, TaskRequest, TaskType};
use mapred::standalone::{engine, Job};
use mapred::worker::{self, executor, Outcome, WorkerConfig};
use mapred::{workload, Workload};
use tempfile::TempDir;

struct Cluster {
    dir: TempDir,
    socket: PathBuf,
    coordinator: RunningCoordinator,
    worker_config: WorkerConfig,
}

impl Cluster {
    /// Write `inputs` as `in-<i>.txt` and start a coordinator over them.
    async fn start(inputs: &[&str], config: CoordinatorConfig) -> Cluster {
        let dir = tempfile::tempdir().unwrap();
        let mut names = Vec::new();
        for (i, text) in inputs.iter().enumerate() {
            let name = format!("in-{i}.txt");
            fs::write(dir.path().join(&name), text).unwrap();
            names.push(name);
        }
        let socket = dir.path().join("coordinator.sock");
        let coordinator = RunningCoordinator::start(names, config, &socket)
            .await
            .unwrap();
        let worker_config = WorkerConfig {
            work_dir: dir.path().to_path_buf(),
            wait_backoff: Duration::from_millis(20),
        };
        Cluster {
            dir,
            socket,
            coordinator,
            worker_config,
        }
    }

    /// Run batches of one-task workers until the job completes.
    async fn run_workers(&self, workload: Workload) {
        let work = async {
            while !self.coordinator.job_complete() {
                let batch: Vec<_> = (0..3)
                    .map(|_| {
                        let socket = self.socket.clone();
                        let config = self.worker_config.clone();
                        tokio::spawn(async move { worker::run(&socket, workload, &config).await })
                    })
                    .collect();
                for handle in batch {
                    handle.await.unwrap().unwrap();
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(30), work)
            .await
            .expect("job did not finish in time");
    }

    /// Each output file's lines, keyed by file name.
    fn outputs(&self) -> BTreeMap<String, Vec<String>> {
        let mut outputs = BTreeMap::new();
        for entry in fs::read_dir(self.dir.path()).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().into_owned();
            if name.starts_with("mr-out-") {
                let text = fs::read_to_string(self.dir.path().join(&name)).unwrap();
                outputs.insert(name, text.lines().map(str::to_string).collect());
            }
        }
        outputs
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn config(n_reduce: u32) -> CoordinatorConfig {
    CoordinatorConfig {
        n_reduce,
        ..CoordinatorConfig::default()
    }
}

fn assert_keys_sorted_and_disjoint(outputs: &BTreeMap<String, Vec<String>>) {
    let mut seen = BTreeSet::new();
    for (name, lines) in outputs {
        let keys: Vec<&str> = lines
            .iter()
            .map(|line| line.split_once(' ').unwrap().0)
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "{name} not sorted");
        for key in keys {
            assert!(seen.insert(key.to_string()), "{key} in more than one file");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn word_count_over_two_buckets() {
    let cluster = Cluster::start(&["a b a", "b c"], config(2)).await;
    cluster.run_workers(workload::named("wc").unwrap()).await;

    let outputs = cluster.outputs();
    assert_eq!(
        outputs.keys().cloned().collect::<Vec<_>>(),
        vec!["mr-out-0", "mr-out-1"]
    );
    assert_keys_sorted_and_disjoint(&outputs);
    let all: BTreeSet<String> = outputs.values().flatten().cloned().collect();
    let expected: BTreeSet<String> = ["a 2", "b 2", "c 1"].iter().map(|s| s.to_string()).collect();
    assert_eq!(all, expected);

    let leftovers = fs::read_dir(cluster.path())
        .unwrap()
        .filter(|e| {
            let name = e.as_ref().unwrap().file_name();
            name.to_string_lossy().starts_with("mr-tmp-")
        })
        .count();
    assert_eq!(leftovers, 0);

    // Anyone arriving after completion is told to exit.
    let outcome = worker::run(
        &cluster.socket,
        workload::named("wc").unwrap(),
        &cluster.worker_config,
    )
    .await
    .unwrap();
    assert_eq!(outcome, Outcome::Exited);
    cluster.coordinator.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distributed_output_matches_sequential_run() {
    let texts = [
        "the quick brown fox jumps over the lazy dog",
        "the dog barks and the fox runs",
        "a lazy afternoon for a quick nap",
        "",
    ];
    for (app, n_reduce) in [("wc", 3), ("indexer", 4), ("wc", 1)] {
        let cluster = Cluster::start(&texts, config(n_reduce)).await;
        let workload = workload::named(app).unwrap();
        cluster.run_workers(workload).await;

        let outputs = cluster.outputs();
        assert_eq!(outputs.len(), n_reduce as usize);
        assert_keys_sorted_and_disjoint(&outputs);
        let mut distributed: Vec<String> = outputs.into_values().flatten().collect();
        distributed.sort();

        let reference = tempfile::tempdir().unwrap();
        let inputs = (0..texts.len())
            .map(|i| cluster.path().join(format!("in-{i}.txt")).display().to_string())
            .collect();
        let out = engine::run(&Job {
            inputs,
            workload: app.into(),
            output: reference.path().to_path_buf(),
        })
        .unwrap();
        let mut sequential: Vec<String> = fs::read_to_string(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        sequential.sort();

        if app == "indexer" {
            // Document names differ between the runs; compare counts only.
            let counts = |lines: &[String]| -> Vec<String> {
                lines
                    .iter()
                    .map(|l| l.rsplit_once(' ').unwrap().0.to_string())
                    .collect()
            };
            assert_eq!(counts(&distributed), counts(&sequential));
        } else {
            assert_eq!(distributed, sequential, "{app} with {n_reduce} buckets");
        }
        cluster.coordinator.shutdown().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn silent_worker_task_is_reassigned() {
    let cluster = Cluster::start(
        &["x y z"],
        CoordinatorConfig {
            n_reduce: 2,
            task_timeout: Duration::from_millis(300),
            scan_interval: Duration::from_millis(50),
        },
    )
    .await;
    let mut client = rpc::connect(&cluster.socket).await.unwrap();
    let ask = |id: &str| TaskRequest {
        worker_id: id.to_string(),
    };

    let first = client.request_task(ask("silent")).await.unwrap().into_inner();
    assert_eq!(first.task_type, TaskType::Map as i32);
    assert_eq!(first.task_id, 0);

    let busy = client.request_task(ask("eager")).await.unwrap().into_inner();
    assert_eq!(busy.task_type, TaskType::Wait as i32);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let again = client.request_task(ask("eager")).await.unwrap().into_inner();
    assert_eq!(again.task_type, TaskType::Map as i32);
    assert_eq!(again.task_id, 0);
    assert_eq!(again.map_input, "in-0.txt");

    // Neither holder reports; real workers pick it up after another timeout.
    cluster.run_workers(workload::named("wc").unwrap()).await;
    let all: BTreeSet<String> = cluster.outputs().into_values().flatten().collect();
    let expected: BTreeSet<String> = ["x 1", "y 1", "z 1"].iter().map(|s| s.to_string()).collect();
    assert_eq!(all, expected);
    cluster.coordinator.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_report_counts_once() {
    let cluster = Cluster::start(&["a b a", "b c"], config(2)).await;
    let mut client = rpc::connect(&cluster.socket).await.unwrap();

    let task = client
        .request_task(TaskRequest {
            worker_id: "twice".into(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(task.task_type, TaskType::Map as i32);
    let files = executor::run_map(
        workload::wc::map,
        task.task_id,
        &task.map_input,
        task.n_reduce,
        cluster.path(),
    )
    .unwrap();

    for _ in 0..2 {
        let ack = client
            .report_task_done(DoneRequest {
                worker_id: "twice".into(),
                task_type: TaskType::from(TaskKind::Map) as i32,
                task_id: task.task_id,
                files: files.clone(),
            })
            .await
            .unwrap()
            .into_inner();
        assert!(ack.exit);
    }
    let status = client.job_status(StatusRequest {}).await.unwrap().into_inner();
    assert_eq!(status.maps_done, 1);
    assert_eq!(status.n_map, 2);
    assert!(!status.done);

    // A reduce report before the reduce phase exists names an unknown task.
    let err = client
        .report_task_done(DoneRequest {
            worker_id: "twice".into(),
            task_type: TaskType::Reduce as i32,
            task_id: 0,
            files: vec![],
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::NotFound);

    cluster.run_workers(workload::named("wc").unwrap()).await;
    let status = client.job_status(StatusRequest {}).await.unwrap().into_inner();
    assert_eq!((status.maps_done, status.reduces_done), (2, 2));
    assert!(status.done);
    cluster.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn worker_without_coordinator_fails() {
    let dir = tempfile::tempdir().unwrap();
    let res = worker::run(
        &dir.path().join("nobody.sock"),
        workload::named("wc").unwrap(),
        &WorkerConfig::default(),
    )
    .await;
    assert!(res.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_with_unreadable_input_does_not_report() {
    let cluster = Cluster::start(&["a"], config(1)).await;
    fs::remove_file(cluster.path().join("in-0.txt")).unwrap();

    let res = worker::run(
        &cluster.socket,
        workload::named("wc").unwrap(),
        &cluster.worker_config,
    )
    .await;
    assert!(res.is_err());
    let progress = cluster.coordinator.progress();
    assert_eq!((progress.maps_done, progress.running), (0, 1));
    cluster.coordinator.shutdown().await.unwrap();
}

/// Hands out map task 0 and answers every report with `reject`.
struct RejectingCoordinator {
    reject: fn() -> tonic::Status,
}

#[tonic::async_trait]
impl rpc::Coordinator for RejectingCoordinator {
    async fn request_task(
        &self,
        _: tonic::Request<TaskRequest>,
    ) -> Result<tonic::Response<rpc::TaskReply>, tonic::Status> {
        Ok(tonic::Response::new(rpc::TaskReply {
            task_type: TaskType::Map as i32,
            task_id: 0,
            map_input: "in-0.txt".into(),
            reduce_inputs: vec![],
            n_reduce: 1,
        }))
    }

    async fn report_task_done(
        &self,
        _: tonic::Request<DoneRequest>,
    ) -> Result<tonic::Response<rpc::DoneReply>, tonic::Status> {
        Err((self.reject)())
    }

    async fn job_status(
        &self,
        _: tonic::Request<StatusRequest>,
    ) -> Result<tonic::Response<rpc::StatusReply>, tonic::Status> {
        Ok(tonic::Response::new(rpc::StatusReply::default()))
    }
}

/// Run one worker against a coordinator that rejects its report.
async fn run_against_rejecting(reject: fn() -> tonic::Status) -> anyhow::Result<Outcome> {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("in-0.txt"), "a b").unwrap();
    let socket = dir.path().join("rejecting.sock");
    let listener = tokio::net::UnixListener::bind(&socket).unwrap();
    let server = tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(rpc::CoordinatorServer::new(RejectingCoordinator { reject }))
            .serve_with_incoming(tokio_stream::wrappers::UnixListenerStream::new(listener)),
    );
    let config = WorkerConfig {
        work_dir: dir.path().to_path_buf(),
        wait_backoff: Duration::from_millis(20),
    };
    let res = worker::run(&socket, workload::named("wc").unwrap(), &config).await;
    server.abort();
    res
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_report_is_fatal_to_the_worker() {
    for reject in [
        (|| tonic::Status::not_found("map task 0 not found")) as fn() -> tonic::Status,
        || tonic::Status::invalid_argument("bad file name"),
    ] {
        let err = run_against_rejecting(reject).await.unwrap_err();
        let rpc_err = err.downcast_ref::<WorkerError>().unwrap();
        assert!(matches!(rpc_err, WorkerError::Rpc { call: "ReportTaskDone", .. }));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lost_report_is_not_fatal() {
    let outcome = run_against_rejecting(|| tonic::Status::unavailable("connection reset"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Completed {
            kind: TaskKind::Map,
            id: 0,
            reported: false
        }
    );
}
