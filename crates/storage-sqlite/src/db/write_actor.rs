use super::{get_connection, DbPool};
use crate::errors::StorageError;
use diesel::SqliteConnection;
use log::debug;
use std::any::Any;
use stonks_core::errors::{DatabaseError, Error, Result};
use tokio::sync::{mpsc, oneshot};

// Jobs return core::Result since that's what callers expect.
type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static>;

type ErasedJob = Job<Box<dyn Any + Send + 'static>>;
type ErasedReply = oneshot::Sender<Result<Box<dyn Any + Send + 'static>>>;

const QUEUE_CAPACITY: usize = 64;

/// Handle for sending jobs to the writer actor.
///
/// Cloning the handle keeps the actor alive; it stops once every handle is
/// dropped and the queue is drained.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<(ErasedJob, ErasedReply)>,
}

impl WriteHandle {
    /// Runs `job` inside an IMMEDIATE transaction on the writer connection.
    ///
    /// The transaction commits when the job returns `Ok` and rolls back
    /// otherwise; a rolled back job surfaces as
    /// [`DatabaseError::TransactionFailed`].
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |c| job(c).map(|v| Box::new(v) as Box<dyn Any + Send>)),
                ret_tx,
            ))
            .await
            .map_err(|_| Error::Closed)?;

        let boxed = ret_rx.await.map_err(|_| {
            Error::Unexpected("Writer stopped before replying".to_string())
        })??;

        boxed
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| Error::Unexpected("Writer returned an unexpected type".to_string()))
    }
}

/// Spawns the single database writer.
///
/// The actor takes one connection from the pool up front and holds it for
/// its lifetime, processing jobs one at a time. Must be called from within a
/// Tokio runtime.
pub fn spawn_writer(pool: &DbPool) -> Result<WriteHandle> {
    let mut conn = get_connection(pool)?;
    let (tx, mut rx) = mpsc::channel::<(ErasedJob, ErasedReply)>(QUEUE_CAPACITY);

    tokio::spawn(async move {
        while let Some((job, reply_tx)) = rx.recv().await {
            let result = conn
                .immediate_transaction::<_, StorageError, _>(|c| job(c).map_err(StorageError::from))
                .map_err(|e| Error::Database(DatabaseError::TransactionFailed(e.to_string())));

            // The requester may have gone away; nothing to report to.
            let _ = reply_tx.send(result);
        }
        debug!("Writer stopped");
    });

    Ok(WriteHandle { tx })
}
