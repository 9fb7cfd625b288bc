use std::error::Error;

// Messages are declared in `src/rpc.rs` with prost derives, so only the
// service glue is generated here and no `protoc` is needed.
fn method(name: &str, route: &str, input: &str, output: &str) -> tonic_build::manual::Method {
    tonic_build::manual::Method::builder()
        .name(name)
        .route_name(route)
        .input_type(input)
        .output_type(output)
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() -> Result<(), Box<dyn Error>> {
    let coordinator = tonic_build::manual::Service::builder()
        .name("Coordinator")
        .package("mapred")
        .method(method(
            "request_task",
            "RequestTask",
            "crate::rpc::TaskRequest",
            "crate::rpc::TaskReply",
        ))
        .method(method(
            "report_task_done",
            "ReportTaskDone",
            "crate::rpc::DoneRequest",
            "crate::rpc::DoneReply",
        ))
        .method(method(
            "job_status",
            "JobStatus",
            "crate::rpc::StatusRequest",
            "crate::rpc::StatusReply",
        ))
        .build();

    tonic_build::manual::Builder::new().compile(&[coordinator]);
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
