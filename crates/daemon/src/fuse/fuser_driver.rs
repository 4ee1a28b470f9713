use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::mount_path::MountPath;
use fuser::{MountOption, Session, SessionUnmounter};
use parking_lot::Mutex;

use super::{ArborFs, DriverCompletion, DriverContext, DriverError, FsDriver};
use crate::server::Mount;

/// Serves mounts through kernel FUSE sessions.
///
/// Each session's request loop runs on a blocking thread of the worker
/// pool; the completion future resolves when that loop returns, which
/// happens once the kernel has detached the mount.
#[derive(Default)]
pub struct FuserDriver {
    sessions: Arc<Mutex<HashMap<MountPath, SessionUnmounter>>>,
}

impl FuserDriver {
    fn options(ctx: &DriverContext) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName("arbor".to_string()),
            MountOption::Subtype("arbor".to_string()),
            MountOption::RO,
            MountOption::DefaultPermissions,
        ];
        if ctx.debug {
            options.push(MountOption::CUSTOM("debug".to_string()));
        }
        options
    }
}

#[async_trait]
impl FsDriver for FuserDriver {
    async fn start_serving(
        &self,
        mount: Arc<Mount>,
        ctx: DriverContext,
    ) -> Result<DriverCompletion, DriverError> {
        let path = mount.path().clone();
        let options = Self::options(&ctx);
        let fs = ArborFs::new(mount, ctx.workers.clone());

        let mount_point = path.as_path().to_path_buf();
        let mut session = tokio::task::spawn_blocking(move || {
            Session::new(fs, &mount_point, &options)
        })
        .await
        .map_err(|e| DriverError::Task(e.to_string()))?
        .map_err(|source| DriverError::Mount {
            path: path.clone(),
            source,
        })?;

        self.sessions
            .lock()
            .insert(path.clone(), session.unmount_callable());
        tracing::info!(mount_point = %path, "fuse session started");

        let run = ctx.workers.spawn_blocking(move || session.run());
        let sessions = Arc::clone(&self.sessions);
        Ok(Box::pin(async move {
            let result = run.await;
            sessions.lock().remove(&path);
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(DriverError::Session { path, source }),
                Err(e) => Err(DriverError::Task(e.to_string())),
            }
        }))
    }

    async fn unmount(&self, path: &MountPath) -> Result<(), DriverError> {
        let mut unmounter = self
            .sessions
            .lock()
            .remove(path)
            .ok_or_else(|| DriverError::NotServing(path.clone()))?;

        let (unmounter, result) = tokio::task::spawn_blocking(move || {
            let result = unmounter.unmount();
            (unmounter, result)
        })
        .await
        .map_err(|e| DriverError::Task(e.to_string()))?;

        if let Err(source) = result {
            // Still mounted; keep the handle so a later attempt can retry.
            self.sessions.lock().insert(path.clone(), unmounter);
            return Err(DriverError::Unmount {
                path: path.clone(),
                source,
            });
        }
        tracing::info!(mount_point = %path, "fuse session unmounted");
        Ok(())
    }
}
