use anyhow::Result;
use sandbox_fs::mem::SandboxBackend;
use sandbox_fs::{ErrorKind, FileSystem};

fn fs() -> FileSystem {
    FileSystem::new(SandboxBackend::new(), "/fs-test", 50 * 1024 * 1024)
}

#[tokio::test]
async fn root_dir_has_no_size() -> Result<()> {
    let fs = fs();
    let stats = fs.head("/").await?;
    assert_eq!(stats.size, None);
    assert!(stats.is_dir());
    Ok(())
}

#[tokio::test]
async fn missing_path_is_not_found() {
    let fs = fs();
    let err = fs.stat("/nothing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.path, "/nothing");
    assert_eq!(err.repository, "/fs-test");
}

#[tokio::test]
async fn one_byte_file_stats_one_byte() -> Result<()> {
    let fs = fs();
    fs.write_all("/file", &[0u8]).await?;
    let stats = fs.stat("/file").await?;
    assert_eq!(stats.size, Some(1));
    assert!(stats.is_file());
    Ok(())
}
