//! Async File System
//!
//! Callback-completion wrappers around [`VirtualFs`]. Every deferred call is
//! queued on one FIFO channel drained by a single worker, so operations run
//! one at a time in the order they were submitted and never interleave. The
//! worker owns its own thread and needs no ambient runtime.

use std::sync::Arc;
use std::thread;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex, MutexGuard};

use super::types::*;
use super::virtual_fs::VirtualFs;
use crate::error::{Errno, FsResult};
use crate::fd::Fd;
use crate::stat::Stat;

/// Runs after the filesystem lock is released.
type Completion = Box<dyn FnOnce() + Send>;

/// A queued operation: runs under the lock and hands back its completion.
type Job = Box<dyn FnOnce(&mut VirtualFs) -> Completion + Send>;

/// Shared handle to a [`VirtualFs`] with async and callback entry points.
#[derive(Debug, Clone)]
pub struct AsyncVirtualFs {
    inner: Arc<Mutex<VirtualFs>>,
    queue: mpsc::UnboundedSender<Job>,
}

impl AsyncVirtualFs {
    /// Wrap `fs` and start the worker that drains the queue. The worker
    /// stops once every handle has been dropped.
    pub fn new(fs: VirtualFs) -> Self {
        let inner = Arc::new(Mutex::new(fs));
        let (queue, jobs) = mpsc::unbounded_channel();
        let worker = Arc::clone(&inner);
        thread::spawn(move || drain(worker, jobs));
        Self { inner, queue }
    }

    /// Direct access for synchronous work. Bypasses the queue, so it is not
    /// ordered with respect to pending submissions.
    pub async fn lock(&self) -> MutexGuard<'_, VirtualFs> {
        self.inner.lock().await
    }

    /// Queue `op` and hand its result to `callback`. Returns immediately;
    /// errors arrive as the callback's argument rather than at the call site.
    /// Operations complete in submission order.
    pub fn submit<T, F, C>(&self, op: F, callback: C)
    where
        T: Send + 'static,
        F: FnOnce(&mut VirtualFs) -> FsResult<T> + Send + 'static,
        C: FnOnce(FsResult<T>) + Send + 'static,
    {
        let job: Job = Box::new(move |fs| {
            let result = op(fs);
            Box::new(move || callback(result))
        });
        if self.queue.send(job).is_err() {
            tracing::warn!("filesystem worker has stopped; dropping submission");
        }
    }

    async fn run<T, F>(&self, op: F) -> FsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut VirtualFs) -> FsResult<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(op, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or_else(|_| Err(Errno::EIO.into()))
    }
}

fn drain(fs: Arc<Mutex<VirtualFs>>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    tracing::debug!("filesystem worker started");
    while let Some(job) = jobs.blocking_recv() {
        let done = {
            let mut fs = fs.blocking_lock();
            job(&mut fs)
        };
        done();
    }
    tracing::debug!("filesystem worker stopped");
}

#[async_trait]
impl FileSystem for AsyncVirtualFs {
    async fn open(&self, path: &str, flags: OpenFlags, mode: Option<u32>) -> FsResult<Fd> {
        let path = path.to_string();
        self.run(move |fs| fs.open(&path, flags, mode)).await
    }

    async fn close(&self, fd: Fd) -> FsResult<()> {
        self.run(move |fs| fs.close(fd)).await
    }

    async fn read(&self, fd: Fd, len: usize, position: Option<u64>) -> FsResult<Vec<u8>> {
        self.run(move |fs| {
            let mut buf = vec![0u8; len];
            let n = fs.read(fd, &mut buf, position)?;
            buf.truncate(n);
            Ok(buf)
        })
        .await
    }

    async fn write(&self, fd: Fd, data: &[u8], position: Option<u64>) -> FsResult<usize> {
        let data = data.to_vec();
        self.run(move |fs| fs.write(fd, &data, position)).await
    }

    async fn lseek(&self, fd: Fd, offset: i64, whence: u32) -> FsResult<u64> {
        self.run(move |fs| fs.lseek(fd, offset, whence)).await
    }

    async fn fsync(&self, fd: Fd) -> FsResult<()> {
        self.run(move |fs| fs.fsync(fd)).await
    }

    async fn fdatasync(&self, fd: Fd) -> FsResult<()> {
        self.run(move |fs| fs.fdatasync(fd)).await
    }

    async fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let path = path.to_string();
        self.run(move |fs| fs.read_file(&path, &ReadFileOptions::default())).await
    }

    async fn read_file_string(&self, path: &str, encoding: BufferEncoding) -> FsResult<String> {
        let path = path.to_string();
        let options = ReadFileOptions { encoding: Some(encoding), ..Default::default() };
        self.run(move |fs| fs.read_file_string(&path, &options)).await
    }

    async fn write_file(&self, path: &str, content: FileContent, options: WriteFileOptions) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.write_file(&path, content, &options)).await
    }

    async fn append_file(&self, path: &str, content: FileContent, options: WriteFileOptions) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.append_file(&path, content, &options)).await
    }

    async fn truncate(&self, path: &str, len: u64) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.truncate(&path, len)).await
    }

    async fn ftruncate(&self, fd: Fd, len: u64) -> FsResult<()> {
        self.run(move |fs| fs.ftruncate(fd, len)).await
    }

    async fn copy_file(&self, src: &str, dest: &str, flags: u32) -> FsResult<()> {
        let (src, dest) = (src.to_string(), dest.to_string());
        self.run(move |fs| fs.copy_file(&src, &dest, flags)).await
    }

    async fn stat(&self, path: &str) -> FsResult<Stat> {
        let path = path.to_string();
        self.run(move |fs| fs.stat(&path)).await
    }

    async fn lstat(&self, path: &str) -> FsResult<Stat> {
        let path = path.to_string();
        self.run(move |fs| fs.lstat(&path)).await
    }

    async fn fstat(&self, fd: Fd) -> FsResult<Stat> {
        self.run(move |fs| fs.fstat(fd)).await
    }

    async fn access(&self, path: &str, mode: u32) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.access(&path, mode)).await
    }

    async fn exists(&self, path: &str) -> bool {
        let path = path.to_string();
        self.run(move |fs| Ok(fs.exists(&path))).await.unwrap_or(false)
    }

    async fn mkdir(&self, path: &str, mode: Option<u32>) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.mkdir(&path, mode)).await
    }

    async fn mkdirp(&self, path: &str, mode: Option<u32>) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.mkdirp(&path, mode)).await
    }

    async fn mkdtemp(&self, prefix: &str) -> FsResult<String> {
        let prefix = prefix.to_string();
        self.run(move |fs| fs.mkdtemp(&prefix)).await
    }

    async fn rmdir(&self, path: &str) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.rmdir(&path)).await
    }

    async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let path = path.to_string();
        self.run(move |fs| fs.readdir(&path)).await
    }

    async fn readdir_with_file_types(&self, path: &str) -> FsResult<Vec<DirentEntry>> {
        let path = path.to_string();
        self.run(move |fs| fs.readdir_with_file_types(&path)).await
    }

    async fn link(&self, existing_path: &str, new_path: &str) -> FsResult<()> {
        let (existing, new) = (existing_path.to_string(), new_path.to_string());
        self.run(move |fs| fs.link(&existing, &new)).await
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.unlink(&path)).await
    }

    async fn symlink(&self, target: &str, link_path: &str) -> FsResult<()> {
        let (target, link) = (target.to_string(), link_path.to_string());
        self.run(move |fs| fs.symlink(&target, &link)).await
    }

    async fn readlink(&self, path: &str) -> FsResult<String> {
        let path = path.to_string();
        self.run(move |fs| fs.readlink(&path)).await
    }

    async fn realpath(&self, path: &str) -> FsResult<String> {
        let path = path.to_string();
        self.run(move |fs| fs.realpath(&path)).await
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        let (old, new) = (old_path.to_string(), new_path.to_string());
        self.run(move |fs| fs.rename(&old, &new)).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.chmod(&path, mode)).await
    }

    async fn lchmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.lchmod(&path, mode)).await
    }

    async fn fchmod(&self, fd: Fd, mode: u32) -> FsResult<()> {
        self.run(move |fs| fs.fchmod(fd, mode)).await
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.chown(&path, uid, gid)).await
    }

    async fn lchown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.lchown(&path, uid, gid)).await
    }

    async fn fchown(&self, fd: Fd, uid: u32, gid: u32) -> FsResult<()> {
        self.run(move |fs| fs.fchown(fd, uid, gid)).await
    }

    async fn utimes(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.utimes(&path, atime, mtime)).await
    }

    async fn futimes(&self, fd: Fd, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        self.run(move |fs| fs.futimes(fd, atime, mtime)).await
    }

    async fn chdir(&self, path: &str) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.chdir(&path)).await
    }

    async fn get_cwd(&self) -> String {
        self.run(|fs| Ok(fs.get_cwd())).await.unwrap_or_default()
    }

    async fn mknod(&self, path: &str, mode: u32, major: u32, minor: u32) -> FsResult<()> {
        let path = path.to_string();
        self.run(move |fs| fs.mknod(&path, mode, major, minor)).await
    }

    async fn mmap(&self, fd: Fd, len: usize, flags: u32) -> FsResult<MmapView> {
        self.run(move |fs| fs.mmap(fd, len, flags)).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    fn fs() -> AsyncVirtualFs {
        AsyncVirtualFs::new(VirtualFs::new().unwrap())
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let fs = fs();
        fs.mkdir("/a", None).await.unwrap();
        fs.write_file("/a/f", "hi".into(), WriteFileOptions::default()).await.unwrap();
        assert_eq!(fs.read_file_string("/a/f", BufferEncoding::Utf8).await.unwrap(), "hi");
        assert!(fs.exists("/a/f").await);
        assert!(!fs.exists("/a/g").await);
    }

    #[tokio::test]
    async fn test_descriptor_roundtrip() {
        let fs = fs();
        let fd = fs.open("/f", (O_RDWR | O_CREAT).into(), None).await.unwrap();
        assert_eq!(fs.write(fd, b"abc", None).await.unwrap(), 3);
        assert_eq!(fs.read(fd, 8, Some(0)).await.unwrap(), b"abc");
        assert_eq!(fs.fstat(fd).await.unwrap().size, 3);
        fs.close(fd).await.unwrap();
        assert_eq!(fs.close(fd).await.unwrap_err().errno(), Some(Errno::EBADF));
    }

    #[tokio::test]
    async fn test_errors_are_returned_not_raised() {
        let fs = fs();
        let err = fs.stat("/missing").await.unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ENOENT));
        assert_eq!(err.to_string(), "ENOENT: no such file or directory, stat '/missing'");
    }

    #[tokio::test]
    async fn test_submit_invokes_callback() {
        let fs = fs();
        let (tx, rx) = oneshot::channel();
        fs.submit(|fs| fs.mkdir("/made", None), move |result| {
            let _ = tx.send(result);
        });
        assert!(rx.await.unwrap().is_ok());
        assert!(fs.lock().await.exists("/made"));
    }

    #[tokio::test]
    async fn test_submit_delivers_errors_to_callback() {
        let fs = fs();
        let (tx, rx) = oneshot::channel();
        fs.submit(|fs| fs.rmdir("/"), move |result| {
            let _ = tx.send(result);
        });
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.errno(), Some(Errno::EBUSY));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_submissions_complete_in_order() {
        let fs = fs();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for i in 0..32usize {
            let tx = tx.clone();
            fs.submit(move |fs| fs.write_file("/log", format!("{} ", i), &WriteFileOptions::default()), move |_| {
                let _ = tx.send(i);
            });
        }
        drop(tx);
        let mut order = Vec::new();
        while let Some(i) = rx.recv().await {
            order.push(i);
        }
        assert_eq!(order, (0..32).collect::<Vec<_>>());
        assert_eq!(fs.read_file_string("/log", BufferEncoding::Utf8).await.unwrap(), "31 ");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_write_submitted_after_mkdir_sees_directory() {
        let fs = fs();
        for round in 0..200 {
            let dir = format!("/d{}", round);
            let file = format!("{}/f", dir);
            fs.submit(move |fs| fs.mkdir(&dir, None), |_| {});
            let (tx, rx) = oneshot::channel();
            fs.submit(move |fs| fs.write_file(&file, "x", &WriteFileOptions::default()), move |result| {
                let _ = tx.send(result);
            });
            assert!(rx.await.unwrap().is_ok(), "round {}", round);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_async_calls_ordered_after_submissions() {
        let fs = fs();
        fs.submit(|fs| fs.mkdirp("/a/b", None), |_| {});
        fs.submit(|fs| fs.write_file("/a/b/f", "queued", &WriteFileOptions::default()), |_| {});
        assert_eq!(fs.read_file_string("/a/b/f", BufferEncoding::Utf8).await.unwrap(), "queued");
    }

    #[test]
    fn test_submit_without_runtime() {
        let fs = fs();
        let (tx, rx) = std::sync::mpsc::channel();
        fs.submit(|fs| fs.mkdir("/plain", None), move |result| {
            let _ = tx.send(result);
        });
        assert!(rx.recv().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cwd_and_realpath() {
        let fs = fs();
        fs.mkdirp("/a/b", None).await.unwrap();
        fs.symlink("/a/b", "/l").await.unwrap();
        fs.chdir("/l").await.unwrap();
        assert_eq!(fs.get_cwd().await, "/a/b");
        assert_eq!(fs.realpath(".").await.unwrap(), "/a/b");
    }
}
