use mockall::mock;
use strata_core::{Image, LaunchDescriptor};
use strata_launch::executor::ServerTool;
use strata_launch::launcher::{LaunchError, Launcher};

mock! {
    Tool {}

    impl ServerTool for Tool {
        async fn start(&self, entrypoint: &str, host: &str, port: u16) -> Result<i32, LaunchError>;
    }
}

fn image(exposed_port: u16, listen_port: u16) -> Image {
    Image {
        tag: "app".to_owned(),
        layers: vec!["ab".repeat(32).parse().unwrap()],
        launch: LaunchDescriptor {
            server_tool: "uvicorn".to_owned(),
            entrypoint: "main:app".to_owned(),
            listen_host: "0.0.0.0".to_owned(),
            listen_port,
        },
        exposed_port,
        workdir: "/app".to_owned(),
    }
}

#[tokio::test]
async fn starts_tool_on_declared_port() {
    let mut tool = MockTool::new();
    tool.expect_start()
        .withf(|entrypoint, host, port| {
            entrypoint.to_string() == "main:app" && host.to_string() == "0.0.0.0" && *port == 8001
        })
        .times(1)
        .returning(|_, _, _| Ok(0));

    let code = Launcher::with_tool(tool).launch(&image(8001, 8001)).await.unwrap();

    assert_eq!(code, 0);
}

#[tokio::test]
async fn exit_code_passes_through() {
    let mut tool = MockTool::new();
    tool.expect_start().times(1).returning(|_, _, _| Ok(137));

    let code = Launcher::with_tool(tool).launch(&image(8001, 8001)).await.unwrap();

    assert_eq!(code, 137);
}

#[tokio::test]
async fn port_mismatch_refuses_to_start() {
    let mut tool = MockTool::new();
    tool.expect_start().times(0);

    let err = Launcher::with_tool(tool)
        .launch(&image(8001, 8000))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LaunchError::PortMismatch {
            exposed: 8001,
            launch: 8000,
            ..
        }
    ));
}

#[tokio::test]
async fn missing_tool_is_surfaced() {
    let mut tool = MockTool::new();
    tool.expect_start().times(1).returning(|_, _, _| {
        Err(LaunchError::NotFound {
            program: "uvicorn".to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })
    });

    let err = Launcher::with_tool(tool)
        .launch(&image(8001, 8001))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("uvicorn not found"));
}

#[test]
fn prepare_returns_launch_argv() {
    let launcher = Launcher::with_tool(MockTool::new());

    let argv = launcher.prepare(&image(8001, 8001)).unwrap();

    assert_eq!(
        argv,
        vec!["uvicorn", "main:app", "--host", "0.0.0.0", "--port", "8001"]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn process_tool_reports_missing_program() {
    use strata_launch::ProcessServerTool;

    let tool = ProcessServerTool::new("strata-test-no-such-server-tool");
    let err = tool.start("main:app", "127.0.0.1", 8001).await.unwrap_err();

    assert!(matches!(err, LaunchError::NotFound { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn host_launch_starts_in_image_workdir() {
    use strata_launch::ProcessServerTool;

    let tmp = tempfile::tempdir().unwrap();
    let rootfs = tmp.path().join("rootfs");
    std::fs::create_dir_all(rootfs.join("app")).unwrap();
    std::fs::write(rootfs.join("app/serve.sh"), "pwd > started-in.txt\nexit 4\n").unwrap();

    // `sh serve.sh --host .. --port ..` only finds the script from the workdir.
    let tool = ProcessServerTool::new("sh").in_dir(rootfs.join("app"));
    let code = tool.start("serve.sh", "0.0.0.0", 8001).await.unwrap();

    assert_eq!(code, 4);
    let started_in = std::fs::read_to_string(rootfs.join("app/started-in.txt")).unwrap();
    assert_eq!(
        std::path::Path::new(started_in.trim()).canonicalize().unwrap(),
        rootfs.join("app").canonicalize().unwrap()
    );
}

#[cfg(unix)]
#[tokio::test]
async fn on_host_launcher_uses_top_layer_rootfs() {
    let tmp = tempfile::tempdir().unwrap();
    let rootfs = tmp.path().join("rootfs");
    std::fs::create_dir_all(rootfs.join("app")).unwrap();
    std::fs::write(rootfs.join("app/main:app"), "exit 0\n").unwrap();

    let mut image = image(8001, 8001);
    image.launch.server_tool = "sh".to_owned();

    // `sh main:app ...` runs the script named like the entry point.
    let code = Launcher::on_host(&image, &rootfs).launch(&image).await.unwrap();

    assert_eq!(code, 0);
}
