use std::{collections::HashMap, future::IntoFuture, marker::PhantomData};

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::{
    bson::{Bson, Document},
    error::{BulkWriteError, Error, ErrorKind, Result},
    operation::bulk_write::BulkWrite as BulkWriteOperation,
    options::{BulkWriteOptions, WriteConcern, WriteModel},
    results::{BulkWriteResult, SummaryBulkWriteResult, VerboseBulkWriteResult},
    BoxFuture,
    Client,
};

use super::{private, Action};

impl Client {
    /// Executes the provided list of write operations.
    ///
    /// A batch that fails with a transient error is sent again once if the batch and the
    /// encountered error support retryability; see
    /// [`ClientOptions::retry_writes`](crate::ClientOptions) for how to opt out.
    ///
    /// `await` will return a [`SummaryBulkWriteResult`], or a [`VerboseBulkWriteResult`] if
    /// [`verbose_results`](BulkWrite::verbose_results) is configured.
    pub fn bulk_write(
        &self,
        models: impl IntoIterator<Item = impl Into<WriteModel>>,
    ) -> BulkWrite<'_, SummaryBulkWriteResult> {
        let mut models_vec = Vec::new();
        for model in models.into_iter() {
            models_vec.push(model.into());
        }
        BulkWrite::new(self, models_vec)
    }
}

/// Performs multiple write operations. Construct with [`Client::bulk_write`].
#[must_use]
pub struct BulkWrite<'a, R> {
    client: &'a Client,
    models: Vec<WriteModel>,
    options: Option<BulkWriteOptions>,
    token: Option<CancellationToken>,
    _phantom: PhantomData<R>,
}

impl<'a> BulkWrite<'a, SummaryBulkWriteResult> {
    /// Return a [`VerboseBulkWriteResult`] with individual results for each successfully performed
    /// write.
    pub fn verbose_results(self) -> BulkWrite<'a, VerboseBulkWriteResult> {
        BulkWrite {
            client: self.client,
            models: self.models,
            options: self.options,
            token: self.token,
            _phantom: PhantomData,
        }
    }
}

impl<'a, R> BulkWrite<'a, R>
where
    R: BulkWriteResult,
{
    fn new(client: &'a Client, models: Vec<WriteModel>) -> Self {
        Self {
            client,
            models,
            options: None,
            token: None,
            _phantom: PhantomData,
        }
    }

    fn options(&mut self) -> &mut BulkWriteOptions {
        self.options.get_or_insert_with(Default::default)
    }

    /// Whether the writes must be executed in the order provided and execution must halt at the
    /// first write error. Defaults to `true`.
    pub fn ordered(mut self, value: bool) -> Self {
        self.options().ordered = Some(value);
        self
    }

    /// Whether document-level validation should be skipped for all writes in this call.
    pub fn bypass_document_validation(mut self, value: bool) -> Self {
        self.options().bypass_document_validation = Some(value);
        self
    }

    /// An arbitrary comment attached to each command batch for server-side log correlation.
    pub fn comment(mut self, value: impl Into<Bson>) -> Self {
        self.options().comment = Some(value.into());
        self
    }

    /// A map of parameter names to values that can be referenced in the filters and updates of
    /// the call via `$$` variable syntax.
    pub fn let_vars(mut self, value: Document) -> Self {
        self.options().let_vars = Some(value);
        self
    }

    /// The write concern the server should apply to the call. Must be acknowledged: replies
    /// cannot be collected for unacknowledged writes.
    pub fn write_concern(mut self, value: WriteConcern) -> Self {
        self.options().write_concern = Some(value);
        self
    }

    /// A token that cancels the call when fired. Cancellation is observed between commands and
    /// between replies; any writes the server has already performed are not undone, and their
    /// results are carried in the error the cancelled call returns.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    fn is_ordered(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|options| options.ordered)
            .unwrap_or(true)
    }

    async fn execute_inner(self) -> Result<R> {
        if let Some(write_concern) = self
            .options
            .as_ref()
            .and_then(|options| options.write_concern.as_ref())
        {
            write_concern.validate()?;
            if !write_concern.is_acknowledged() {
                return Err(ErrorKind::InvalidArgument {
                    message: "bulk writes cannot be performed with an unacknowledged write \
                              concern"
                        .to_string(),
                }
                .into());
            }
        }

        let operation = BulkWriteOperation::<R>::new(
            &self.models,
            self.options.as_ref(),
            self.client.stream_description(),
        )?;
        let token = self.token.clone().unwrap_or_default();
        let ordered = self.is_ordered();

        let mut execution_status = ExecutionStatus::None;
        for batch in operation.batches() {
            if !execution_status.should_continue(ordered) {
                break;
            }

            let batch_result = match self
                .client
                .send_with_retry(&batch.command, batch.retryability(), &token)
                .await
            {
                Ok(replies) => operation.reconcile(batch, replies, &token).await,
                Err(error) => Err(error),
            };

            match batch_result {
                Ok(result) => {
                    execution_status = execution_status.with_success(result);
                }
                Err(error) => {
                    execution_status = execution_status.with_failure(error);
                }
            }
        }

        match execution_status {
            ExecutionStatus::Success(bulk_write_result) => Ok(bulk_write_result),
            ExecutionStatus::Error(error) => Err(error),
            ExecutionStatus::None => Err(ErrorKind::InvalidArgument {
                message: "bulk_write must be provided at least one write operation".into(),
            }
            .into()),
        }
    }
}

impl<'a, R> private::Sealed for BulkWrite<'a, R> where R: BulkWriteResult {}

impl<'a, R> Action for BulkWrite<'a, R> where R: BulkWriteResult + 'a {}

impl<'a, R> IntoFuture for BulkWrite<'a, R>
where
    R: BulkWriteResult + 'a,
{
    type Output = Result<R>;
    type IntoFuture = BoxFuture<'a, Result<R>>;

    fn into_future(self) -> Self::IntoFuture {
        self.execute_inner().boxed()
    }
}

/// Tracks the status of a bulk write across its batches. The status starts at `None`, indicating
/// that no writes have been attempted yet, and transitions to either `Success` or `Error` as
/// batches are executed. The contents of `Error` determine whether the bulk write can continue
/// with further batches or should be terminated.
enum ExecutionStatus<R>
where
    R: BulkWriteResult,
{
    Success(R),
    Error(Error),
    None,
}

impl<R> ExecutionStatus<R>
where
    R: BulkWriteResult,
{
    fn with_success(mut self, result: R) -> Self {
        match self {
            // Merge two successful sets of results together.
            Self::Success(ref mut current_result) => {
                current_result.merge(result);
                self
            }
            // Merge the results of the new batch into the existing bulk write error.
            Self::Error(ref mut current_error) => {
                let bulk_write_error = Self::get_current_bulk_write_error(current_error);
                bulk_write_error.merge_partial_results(Some(result.into_partial_result()));
                self
            }
            Self::None => Self::Success(result),
        }
    }

    fn with_failure(self, mut error: Error) -> Self {
        match self {
            // If the new error is a BulkWriteError, merge the successful results into the error's
            // partial result. Otherwise, create a new BulkWriteError with the existing results and
            // set its source as the error that just occurred.
            Self::Success(current_result) => match *error.kind {
                ErrorKind::BulkWrite(ref mut bulk_write_error) => {
                    bulk_write_error
                        .merge_partial_results(Some(current_result.into_partial_result()));
                    Self::Error(error)
                }
                _ => {
                    let bulk_write_error: Error = ErrorKind::BulkWrite(BulkWriteError {
                        write_errors: HashMap::new(),
                        partial_result: Some(current_result.into_partial_result()),
                    })
                    .into();
                    Self::Error(bulk_write_error.with_source(error))
                }
            },
            // If the new error is a BulkWriteError, merge its contents with the existing error,
            // carrying over its source if the existing error does not already have one. Otherwise,
            // set the new error as the existing error's source.
            Self::Error(mut current_error) => match *error.kind {
                ErrorKind::BulkWrite(bulk_write_error) => {
                    let current_bulk_write_error =
                        Self::get_current_bulk_write_error(&mut current_error);
                    current_bulk_write_error.merge(bulk_write_error);
                    if current_error.source.is_none() {
                        current_error.source = error.source;
                    }
                    Self::Error(current_error)
                }
                _ => Self::Error(current_error.with_source(error)),
            },
            Self::None => Self::Error(error),
        }
    }

    /// Gets a BulkWriteError from a given Error. This method should only be called when adding a
    /// new result or error to the existing state, as it requires that the given Error's kind is
    /// BulkWrite.
    fn get_current_bulk_write_error(error: &mut Error) -> &mut BulkWriteError {
        match *error.kind {
            ErrorKind::BulkWrite(ref mut bulk_write_error) => bulk_write_error,
            _ => unreachable!(),
        }
    }

    /// Whether further bulk write batches should be executed based on the current status of
    /// execution.
    fn should_continue(&self, ordered: bool) -> bool {
        match self {
            Self::Error(ref error) => {
                match *error.kind {
                    ErrorKind::BulkWrite(ref bulk_write_error) => {
                        // A top-level error is always fatal.
                        let top_level_error_occurred = error.source.is_some();
                        // A write error occurring during an ordered bulk write is fatal.
                        let terminal_write_error_occurred =
                            ordered && !bulk_write_error.write_errors.is_empty();

                        !top_level_error_occurred && !terminal_write_error_occurred
                    }
                    // A top-level error is always fatal.
                    _ => false,
                }
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ExecutionStatus;
    use crate::{
        error::{BulkWriteError, Error, ErrorKind, PartialBulkWriteResult, WriteError},
        results::{BulkWriteResult, SummaryBulkWriteResult},
    };

    fn write_error(code: i32) -> WriteError {
        WriteError {
            code,
            code_name: None,
            message: "failed".to_string(),
            details: None,
        }
    }

    fn batch_error(indices: &[usize], source: impl Into<Option<Error>>) -> Error {
        let mut error = BulkWriteError::default();
        for &index in indices {
            error.write_errors.insert(index, write_error(11000));
        }
        Error::new(ErrorKind::BulkWrite(error), None::<Vec<String>>).with_source(source)
    }

    fn summary(inserted: i64) -> SummaryBulkWriteResult {
        let mut result = SummaryBulkWriteResult::default();
        result.populate_summary_info(inserted, 0, 0, 0, 0);
        result
    }

    #[test]
    fn write_errors_halt_only_ordered_execution() {
        let status =
            ExecutionStatus::<SummaryBulkWriteResult>::None.with_failure(batch_error(&[0], None));
        assert!(status.should_continue(false));
        assert!(!status.should_continue(true));
    }

    #[test]
    fn failures_with_a_cause_are_always_fatal() {
        let status = ExecutionStatus::<SummaryBulkWriteResult>::None
            .with_failure(batch_error(&[], Error::cancelled("cancelled")));
        assert!(!status.should_continue(false));
        assert!(!status.should_continue(true));

        let status = ExecutionStatus::<SummaryBulkWriteResult>::None
            .with_failure(Error::cancelled("cancelled"));
        assert!(!status.should_continue(false));
    }

    #[test]
    fn earlier_successes_attach_to_later_errors() {
        let status = ExecutionStatus::None
            .with_success(summary(2))
            .with_failure(batch_error(&[2], None));
        match status {
            ExecutionStatus::Error(error) => match *error.kind {
                ErrorKind::BulkWrite(bulk_write_error) => {
                    assert_eq!(bulk_write_error.write_errors.len(), 1);
                    assert!(bulk_write_error.write_errors.contains_key(&2));
                    match bulk_write_error.partial_result {
                        Some(PartialBulkWriteResult::Summary(partial)) => {
                            assert_eq!(partial.inserted_count, 2);
                        }
                        other => panic!("expected a summary partial result, got {:?}", other),
                    }
                }
                other => panic!("expected a bulk write error, got {:?}", other),
            },
            _ => panic!("expected an error status"),
        }
    }

    #[test]
    fn later_successes_fold_into_an_existing_error() {
        let status = ExecutionStatus::None
            .with_failure(batch_error(&[1], None))
            .with_success(summary(3));
        assert!(status.should_continue(false));
        match status {
            ExecutionStatus::Error(error) => match *error.kind {
                ErrorKind::BulkWrite(bulk_write_error) => match bulk_write_error.partial_result {
                    Some(PartialBulkWriteResult::Summary(partial)) => {
                        assert_eq!(partial.inserted_count, 3);
                    }
                    other => panic!("expected a summary partial result, got {:?}", other),
                },
                other => panic!("expected a bulk write error, got {:?}", other),
            },
            _ => panic!("expected an error status"),
        }
    }

    #[test]
    fn merged_batch_errors_keep_their_fatal_cause() {
        let status =
            ExecutionStatus::<SummaryBulkWriteResult>::None.with_failure(batch_error(&[0], None));
        assert!(status.should_continue(false));

        let status = status.with_failure(batch_error(&[3], Error::cancelled("cancelled")));
        assert!(!status.should_continue(false));
        match status {
            ExecutionStatus::Error(error) => {
                assert!(error.source.is_some());
                match *error.kind {
                    ErrorKind::BulkWrite(bulk_write_error) => {
                        assert_eq!(bulk_write_error.write_errors.len(), 2);
                    }
                    other => panic!("expected a bulk write error, got {:?}", other),
                }
            }
            _ => panic!("expected an error status"),
        }
    }
}
