use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use sandbox_fs::mem::SandboxBackend;
use sandbox_fs::{
    CopyOptions, ErrorKind, FileSystem, ReadOptions, SeekOrigin, UrlKind, WriteOptions,
};

fn fs() -> FileSystem {
    FileSystem::new(SandboxBackend::new(), "/fs-test", 50 * 1024 * 1024)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[tokio::test]
async fn root_dir_starts_empty() -> Result<()> {
    let fs = fs();
    assert!(fs.list("/").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn add_empty_file() -> Result<()> {
    let fs = fs();
    let file = fs.get_file("/empty.txt");
    assert_eq!(file.stat().await.unwrap_err().kind(), ErrorKind::NotFound);

    file.write_all(b"").await?;
    assert_eq!(file.stat().await?.size, Some(0));
    Ok(())
}

#[tokio::test]
async fn add_text_file() -> Result<()> {
    let fs = fs();
    let file = fs.get_file("/test.txt");
    assert_eq!(file.stat().await.unwrap_err().kind(), ErrorKind::NotFound);

    file.write_all(b"test").await?;
    assert_eq!(file.stat().await?.size, Some(4));

    let mut rs = file.read_stream(ReadOptions::default());
    let buffer = rs.read(None).await?;
    assert_eq!(&buffer[..], b"test");
    rs.close();
    Ok(())
}

#[tokio::test]
async fn continuous_read_and_write() -> Result<()> {
    let fs = fs();
    let file = fs.get_file("/otani.txt");

    let mut ws = file.write_stream(WriteOptions::default());
    ws.write("大谷".as_bytes()).await?;
    ws.write("翔平".as_bytes()).await?;

    let mut rs = file.read_stream(ReadOptions::default());
    let buffer = rs.read(Some(6)).await?;
    assert_eq!(std::str::from_utf8(&buffer)?, "大谷");

    rs.seek(6, SeekOrigin::Begin).await?;
    let buffer = rs.read(None).await?;
    assert_eq!(std::str::from_utf8(&buffer)?, "翔平");

    ws.seek(0, SeekOrigin::End).await?;
    ws.write("ホームラン".as_bytes()).await?;

    rs.seek(0, SeekOrigin::Begin).await?;
    let buffer = rs.read(None).await?;
    assert_eq!(std::str::from_utf8(&buffer)?, "大谷翔平ホームラン");

    rs.seek(0, SeekOrigin::Begin).await?;
    rs.read(Some(6)).await?;
    rs.seek(6, SeekOrigin::Current).await?;
    let buffer = rs.read(None).await?;
    assert_eq!(std::str::from_utf8(&buffer)?, "ホームラン");

    ws.close();
    rs.close();
    Ok(())
}

#[tokio::test]
async fn reading_past_end_of_file_is_empty_not_an_error() -> Result<()> {
    let fs = fs();
    fs.write_all("/short.txt", b"abc").await?;

    let file = fs.get_file("/short.txt");
    let mut rs = file.read_stream(ReadOptions::default());
    rs.seek(100, SeekOrigin::Begin).await?;
    assert!(rs.read(None).await?.is_empty());
    rs.close();
    Ok(())
}

#[tokio::test]
async fn mkdir() -> Result<()> {
    let fs = fs();
    fs.write_all("/a.txt", b"a").await?;

    let folder = fs.get_directory("/folder");
    assert_eq!(folder.stat().await.unwrap_err().kind(), ErrorKind::NotFound);
    folder.create().await?;
    assert!(folder.stat().await?.is_dir());

    let listing = fs.list("/").await?;
    assert_eq!(listing.len(), 2);
    assert!(listing.contains(&"/a.txt".to_string()));
    assert!(listing.contains(&"/folder".to_string()));
    Ok(())
}

#[tokio::test]
async fn create_file_in_dir() -> Result<()> {
    let fs = fs();
    fs.get_directory("/folder").create().await?;

    let file = fs.get_file("/folder/sample.txt");
    assert_eq!(file.stat().await.unwrap_err().kind(), ErrorKind::NotFound);

    let before = now_millis();
    file.write_all(b"Sample").await?;
    let after = now_millis() + 1;

    let stats = file.stat().await?;
    let modified = stats.modified.unwrap_or(0);
    assert!(before <= modified && modified <= after);

    assert_eq!(file.read_all().await?, b"Sample");

    let listing = fs.get_directory("/folder").list().await?;
    assert!(listing.contains(&"/folder/sample.txt".to_string()));
    Ok(())
}

#[tokio::test]
async fn copy_directory() -> Result<()> {
    let fs = fs();
    fs.get_directory("/folder").create().await?;
    fs.write_all("/folder/sample.txt", b"Sample").await?;

    let from = fs.get_directory("/folder");
    let to = fs.get_directory("/folder2");
    let errors = from
        .copy_to(
            &to,
            CopyOptions {
                force: false,
                recursive: true,
            },
        )
        .await;
    assert!(errors.is_empty());

    // Directory stats never carry a size.
    assert_eq!(to.stat().await?.size, None);

    assert!(fs.list("/").await?.contains(&"/folder2".to_string()));
    assert!(to
        .list()
        .await?
        .contains(&"/folder2/sample.txt".to_string()));
    assert_eq!(fs.read_all("/folder2/sample.txt").await?, b"Sample");
    Ok(())
}

#[tokio::test]
async fn copy_without_force_records_path_exists() -> Result<()> {
    let fs = fs();
    fs.get_directory("/folder").create().await?;
    fs.get_directory("/folder2").create().await?;

    let errors = fs
        .copy(
            "/folder",
            "/folder2",
            CopyOptions {
                force: false,
                recursive: true,
            },
        )
        .await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::PathExists);
    Ok(())
}

#[tokio::test]
async fn copy_with_force_overwrites_existing_entries() -> Result<()> {
    let fs = fs();
    fs.get_directory("/src").create().await?;
    fs.write_all("/src/a.txt", b"a").await?;
    fs.write_all("/src/b.txt", b"b").await?;
    fs.get_directory("/dst").create().await?;
    fs.write_all("/dst/a.txt", b"old").await?;

    let errors = fs
        .get_directory("/src")
        .copy_to(
            &fs.get_directory("/dst"),
            CopyOptions {
                force: true,
                recursive: true,
            },
        )
        .await;
    assert!(errors.is_empty());
    assert_eq!(fs.read_all("/dst/a.txt").await?, b"a");
    assert_eq!(fs.read_all("/dst/b.txt").await?, b"b");
    Ok(())
}

#[tokio::test]
async fn copy_continues_past_entry_failures_and_aggregates() -> Result<()> {
    // Quota fits the source tree but not a full copy, so each file copy
    // fails independently while the walk keeps going.
    let fs = FileSystem::new(SandboxBackend::new(), "/fs-test", 10);
    fs.get_directory("/src").create().await?;
    fs.write_all("/src/a.txt", b"aaaa").await?;
    fs.write_all("/src/b.txt", b"bbbb").await?;

    let errors = fs
        .copy(
            "/src",
            "/dst",
            CopyOptions {
                force: false,
                recursive: true,
            },
        )
        .await;
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|err| err.kind() == ErrorKind::QuotaExceeded));
    // The destination directory itself was still created.
    assert!(fs.stat("/dst").await?.is_dir());
    Ok(())
}

#[tokio::test]
async fn non_recursive_copy_skips_subdirectories() -> Result<()> {
    let fs = fs();
    fs.get_directory("/src").create().await?;
    fs.write_all("/src/file.txt", b"x").await?;
    fs.get_directory("/src/sub").create().await?;
    fs.write_all("/src/sub/nested.txt", b"y").await?;

    let errors = fs
        .copy(
            "/src",
            "/dst",
            CopyOptions {
                force: false,
                recursive: false,
            },
        )
        .await;
    assert!(errors.is_empty());

    let listing = fs.list("/dst").await?;
    assert!(listing.contains(&"/dst/file.txt".to_string()));
    assert!(!listing.contains(&"/dst/sub".to_string()));
    Ok(())
}

#[tokio::test]
async fn move_file() -> Result<()> {
    let fs = fs();
    fs.get_directory("/folder2").create().await?;
    fs.write_all("/folder2/sample.txt", b"Sample").await?;

    let errors = fs
        .move_entry("/folder2/sample.txt", "/folder2/sample2.txt")
        .await;
    assert!(errors.is_empty());

    let listing = fs.list("/folder2").await?;
    assert!(!listing.contains(&"/folder2/sample.txt".to_string()));
    assert!(listing.contains(&"/folder2/sample2.txt".to_string()));
    Ok(())
}

#[tokio::test]
async fn move_directory() -> Result<()> {
    let fs = fs();
    fs.get_directory("/folder2").create().await?;
    fs.write_all("/folder2/sample2.txt", b"Sample").await?;

    let errors = fs.move_entry("/folder2", "/folder3").await;
    assert!(errors.is_empty());

    let listing = fs.list("/").await?;
    assert!(!listing.contains(&"/folder2".to_string()));
    assert!(listing.contains(&"/folder3".to_string()));

    let folder3 = fs.get_directory("/folder3").list().await?;
    assert!(folder3.contains(&"/folder3/sample2.txt".to_string()));
    Ok(())
}

#[tokio::test]
async fn remove_non_empty_dir_requires_recursive() -> Result<()> {
    let fs = fs();
    fs.get_directory("/folder").create().await?;
    fs.write_all("/folder/keep.txt", b"k").await?;

    assert_eq!(
        fs.remove("/folder", false).await.unwrap_err().kind(),
        ErrorKind::InvalidState
    );

    fs.remove("/folder", true).await?;
    assert_eq!(
        fs.stat("/folder").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    Ok(())
}

#[tokio::test]
async fn remove_file_and_empty_dir() -> Result<()> {
    let fs = fs();
    fs.write_all("/gone.txt", b"x").await?;
    fs.remove("/gone.txt", false).await?;
    assert_eq!(
        fs.stat("/gone.txt").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );

    fs.get_directory("/empty").create().await?;
    fs.remove("/empty", false).await?;
    assert_eq!(
        fs.stat("/empty").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    Ok(())
}

#[tokio::test]
async fn to_url_supports_read_access_only() -> Result<()> {
    let fs = fs();
    fs.write_all("/file.txt", b"x").await?;

    let url = fs.to_url("/file.txt", UrlKind::Read).await?;
    assert!(url.starts_with("sandbox:"));

    assert_eq!(
        fs.to_url("/file.txt", UrlKind::Write)
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotSupported
    );
    Ok(())
}

#[tokio::test]
async fn patch_is_not_supported() {
    let fs = fs();
    let err = fs
        .patch("/anything", sandbox_fs::Metadata::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotSupported);
}
