mod compile;
mod server_responses;

use std::{collections::HashMap, marker::PhantomData};

use tokio_util::sync::CancellationToken;

use crate::{
    bson::{rawdoc, Bson, RawDocumentBuf},
    bson_util,
    checked::Checked,
    conn::{Command, ReplyStream, StreamDescription},
    cursor::Cursor,
    error::{BulkWriteError, Error, ErrorKind, Result},
    operation::{Retryability, COMMAND_OVERHEAD_SIZE},
    options::{BulkWriteOptions, OperationType, WriteModel},
    results::{BulkWriteResult, DeleteResult, InsertOneResult, UpdateResult},
};

use compile::{compile_writes, CompiledWrite, NamespaceInfo};
use server_responses::*;

/// A bulk write call compiled down to the command batches that carry it out. Construction
/// performs all validation and batch planning, so a constructed operation is guaranteed to be
/// expressible on the wire; anything that follows can only fail against the server.
pub(crate) struct BulkWrite<'a, R>
where
    R: BulkWriteResult,
{
    writes: Vec<CompiledWrite<'a>>,
    batches: Vec<Batch>,
    _phantom: PhantomData<R>,
}

impl<'a, R> BulkWrite<'a, R>
where
    R: BulkWriteResult,
{
    pub(crate) const NAME: &'static str = "bulkWrite";

    pub(crate) fn new(
        models: &'a [WriteModel],
        options: Option<&BulkWriteOptions>,
        description: &StreamDescription,
    ) -> Result<BulkWrite<'a, R>> {
        let max_operations: usize = Checked::new(description.max_write_batch_size).try_into()?;
        let max_message_size: usize = Checked::new(description.max_message_size_bytes).try_into()?;

        let command_body = Self::command_body(options)?;
        let budget = (Checked::new(max_message_size)
            - COMMAND_OVERHEAD_SIZE
            - command_body.as_bytes().len())
        .get()?;

        let (writes, namespaces) = compile_writes(models, budget)?;
        let batches = Self::plan_batches(&writes, &namespaces, &command_body, budget, max_operations)?;

        Ok(Self {
            writes,
            batches,
            _phantom: PhantomData,
        })
    }

    /// The fields of the command body, identical for every batch of the call.
    fn command_body(options: Option<&BulkWriteOptions>) -> Result<RawDocumentBuf> {
        let mut body = rawdoc! { Self::NAME: 1 };
        let mut options = match options {
            Some(options) => crate::bson::to_raw_document_buf(options),
            None => crate::bson::to_raw_document_buf(&BulkWriteOptions::default()),
        }?;
        options.append("errorsOnly", R::errors_only());
        bson_util::extend_raw_document_buf(&mut body, options)?;
        Ok(body)
    }

    fn plan_batches(
        writes: &[CompiledWrite<'_>],
        namespaces: &NamespaceInfo<'_>,
        command_body: &RawDocumentBuf,
        budget: usize,
        max_operations: usize,
    ) -> Result<Vec<Batch>> {
        let mut batches = Vec::new();
        let mut offset = 0;
        while offset < writes.len() {
            let batch = Self::plan_batch(
                writes,
                namespaces,
                command_body,
                budget,
                max_operations,
                offset,
            )?;
            offset += batch.n_ops;
            batches.push(batch);
        }
        Ok(batches)
    }

    /// Plans the batch beginning at `offset`: greedily adds writes while the operation count and
    /// size limits allow, re-indexing each write's namespace into the batch's own nsInfo list.
    fn plan_batch(
        writes: &[CompiledWrite<'_>],
        namespaces: &NamespaceInfo<'_>,
        command_body: &RawDocumentBuf,
        budget: usize,
        max_operations: usize,
        offset: usize,
    ) -> Result<Batch> {
        let mut ops: Vec<RawDocumentBuf> = Vec::new();
        let mut namespace_entries: Vec<RawDocumentBuf> = Vec::new();
        // Maps call-wide namespace indices to their indices in this batch's nsInfo list.
        let mut local_indices: HashMap<usize, usize> = HashMap::new();
        let mut current_size = Checked::new(0usize);
        let mut has_multi_write = false;

        for write in writes[offset..].iter().take(max_operations) {
            let (local_index, pending_entry) = match local_indices.get(&write.namespace_index) {
                Some(local_index) => (*local_index, None),
                None => {
                    let entry = namespaces.entries[write.namespace_index].clone();
                    (namespace_entries.len(), Some(entry))
                }
            };
            let namespace_size = pending_entry
                .as_ref()
                .map_or(0, |entry| entry.as_bytes().len());

            current_size += (Checked::new(write.entry_size()?) + namespace_size).get()?;
            if current_size.get()? > budget {
                break;
            }

            // A namespace entry is charged to the batch at the first write in the batch that
            // references it; if that write did not fit, the entry leaves with it.
            if let Some(entry) = pending_entry {
                local_indices.insert(write.namespace_index, namespace_entries.len());
                namespace_entries.push(entry);
            }

            let mut entry = rawdoc! { write.model.operation_name(): local_index as i32 };
            bson_util::extend_raw_document_buf(&mut entry, write.payload.clone())?;
            ops.push(entry);

            if write.model.multi() == Some(true) {
                has_multi_write = true;
            }
        }

        if ops.is_empty() {
            // Compilation bounds every write by the batch budget, so the first write of a batch
            // always fits.
            return Err(Error::internal(format!(
                "write at index {offset} could not be added to an empty batch"
            )));
        }

        let n_ops = ops.len();
        let mut command = Command::new(Self::NAME, "admin", command_body.clone());
        command.add_document_sequence("ops", ops);
        command.add_document_sequence("nsInfo", namespace_entries);

        Ok(Batch {
            offset,
            n_ops,
            has_multi_write,
            command,
        })
    }

    /// The planned batches, in send order. Batch offsets and lengths tile the input list.
    pub(crate) fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Consumes the reply stream of one batch and folds each reply into a result for the batch.
    /// Returns the accumulated result, or an error carrying the write errors and whatever partial
    /// result had accumulated when the stream failed.
    pub(crate) async fn reconcile(
        &self,
        batch: &Batch,
        reply_stream: ReplyStream,
        token: &CancellationToken,
    ) -> Result<R> {
        let mut replies: Cursor<SingleOperationResponse> = Cursor::new(reply_stream);
        let mut n_replied = 0;
        let mut result = R::default();
        let mut error = BulkWriteError::default();

        let iteration_result = self
            .iterate_replies(
                batch,
                &mut replies,
                &mut n_replied,
                &mut result,
                &mut error,
                token,
            )
            .await;

        if iteration_result.is_ok() && error.write_errors.is_empty() {
            Ok(result)
        } else {
            // The partial result should only be populated if at least one write succeeded.
            if n_replied > error.write_errors.len() {
                error.partial_result = Some(result.into_partial_result());
            }

            Err(
                Error::new(ErrorKind::BulkWrite(error), None::<Vec<String>>)
                    .with_source(iteration_result.err()),
            )
        }
    }

    async fn iterate_replies(
        &self,
        batch: &Batch,
        replies: &mut Cursor<SingleOperationResponse>,
        n_replied: &mut usize,
        result: &mut R,
        error: &mut BulkWriteError,
        token: &CancellationToken,
    ) -> Result<()> {
        while !token.is_cancelled() {
            match replies.try_next().await? {
                Some(response) => {
                    *n_replied += 1;
                    self.handle_individual_response(response, batch, result, error)?;
                }
                None => return Ok(()),
            }
        }
        Err(Error::cancelled("bulk write cancelled while reading replies"))
    }

    fn handle_individual_response(
        &self,
        response: SingleOperationResponse,
        batch: &Batch,
        result: &mut R,
        error: &mut BulkWriteError,
    ) -> Result<()> {
        let write = self.get_write(batch, response.index)?;
        let index = batch.offset + response.index;
        match response.result {
            SingleOperationResult::Success {
                n,
                n_modified,
                upserted,
            } => match write.model.operation_type() {
                OperationType::Insert => {
                    let inserted_id = self.get_inserted_id(index)?;
                    result.add_insert_result(index, InsertOneResult { inserted_id });
                    result.populate_summary_info(1, 0, 0, 0, 0);
                }
                OperationType::Update => {
                    // The server counts an upserted document in n but not in the matched total.
                    let n_upserted = i64::from(upserted.is_some());
                    // default to 0 when the server omits nModified
                    let modified_count = n_modified.unwrap_or(0);
                    let update_result = UpdateResult {
                        matched_count: n,
                        modified_count,
                        upserted_id: upserted.map(|upserted| upserted.id),
                    };
                    result.add_update_result(index, update_result);
                    result.populate_summary_info(
                        0,
                        n as i64 - n_upserted,
                        modified_count as i64,
                        n_upserted,
                        0,
                    );
                }
                OperationType::Delete => {
                    result.add_delete_result(index, DeleteResult { deleted_count: n });
                    result.populate_summary_info(0, 0, 0, 0, n as i64);
                }
            },
            SingleOperationResult::Error(write_error) => {
                error.write_errors.insert(index, write_error);
            }
        }
        Ok(())
    }

    fn get_write(&self, batch: &Batch, batch_index: usize) -> Result<&CompiledWrite<'a>> {
        if batch_index < batch.n_ops {
            if let Some(write) = self.writes.get(batch.offset + batch_index) {
                return Ok(write);
            }
        }
        Err(ErrorKind::InvalidResponse {
            message: format!("invalid operation index returned from bulkWrite: {batch_index}"),
        }
        .into())
    }

    fn get_inserted_id(&self, index: usize) -> Result<Bson> {
        match self
            .writes
            .get(index)
            .and_then(|write| write.inserted_id.as_ref())
        {
            Some(inserted_id) => Ok(inserted_id.clone()),
            None => Err(ErrorKind::InvalidResponse {
                message: format!("invalid index returned for insert operation: {index}"),
            }
            .into()),
        }
    }
}

/// One planned command batch.
pub(crate) struct Batch {
    /// The call-wide index of the first write in this batch.
    pub(crate) offset: usize,

    /// The number of writes in this batch.
    pub(crate) n_ops: usize,

    has_multi_write: bool,

    /// The batch's command, built once at planning time so that a retried batch is sent
    /// byte-for-byte identical to its first attempt.
    pub(crate) command: Command,
}

impl Batch {
    /// Multi-document writes may have applied partially before a transient failure, so a batch
    /// containing one cannot safely be retried.
    pub(crate) fn retryability(&self) -> Retryability {
        if self.has_multi_write {
            Retryability::None
        } else {
            Retryability::Write
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BulkWrite;
    use crate::{
        bson::{doc, rawdoc, Document},
        conn::StreamDescription,
        operation::{Retryability, COMMAND_OVERHEAD_SIZE},
        options::{BulkWriteOptions, WriteModel},
        results::{SummaryBulkWriteResult, VerboseBulkWriteResult},
        Namespace,
    };

    fn insert(ns: &Namespace, document: Document) -> WriteModel {
        WriteModel::InsertOne {
            namespace: ns.clone(),
            document,
        }
    }

    /// An insert whose ops entry occupies exactly 549 bytes, targeting a namespace whose nsInfo
    /// entry occupies exactly 21 bytes ("db" plus a four-letter collection name).
    fn padded_insert(ns: &Namespace, id: i32) -> WriteModel {
        insert(ns, doc! { "_id": id, "a": "x".repeat(500) })
    }

    /// The default command body is {bulkWrite: 1, ordered: true, errorsOnly: true}, 43 bytes, so
    /// this yields a batch size budget of exactly `budget`.
    fn description_with_budget(budget: i32) -> StreamDescription {
        StreamDescription::builder()
            .max_message_size_bytes(COMMAND_OVERHEAD_SIZE as i32 + 43 + budget)
            .build()
    }

    #[test]
    fn batches_split_at_the_operation_count_limit() {
        let ns = Namespace::new("db", "coll");
        let models: Vec<_> = (0..10).map(|i| insert(&ns, doc! { "_id": i })).collect();
        let description = StreamDescription::builder().max_write_batch_size(4).build();

        let operation =
            BulkWrite::<SummaryBulkWriteResult>::new(&models, None, &description).unwrap();

        let sizes: Vec<_> = operation
            .batches()
            .iter()
            .map(|batch| (batch.offset, batch.n_ops))
            .collect();
        assert_eq!(sizes, vec![(0, 4), (4, 4), (8, 2)]);

        let covered: Vec<_> = operation
            .batches()
            .iter()
            .flat_map(|batch| batch.offset..batch.offset + batch.n_ops)
            .collect();
        assert_eq!(covered, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn batches_split_when_the_size_budget_fills() {
        let ns = Namespace::new("db", "coll");
        let models = vec![padded_insert(&ns, 1), padded_insert(&ns, 2)];

        // One write and its namespace entry occupy 570 bytes; two writes need 1119.
        let description = description_with_budget(1000);
        let operation =
            BulkWrite::<SummaryBulkWriteResult>::new(&models, None, &description).unwrap();

        let sizes: Vec<_> = operation
            .batches()
            .iter()
            .map(|batch| (batch.offset, batch.n_ops))
            .collect();
        assert_eq!(sizes, vec![(0, 1), (1, 1)]);
    }

    #[test]
    fn namespace_entries_follow_their_writes_to_the_next_batch() {
        let first = Namespace::new("db", "aaaa");
        let second = Namespace::new("db", "bbbb");
        let models = vec![
            padded_insert(&first, 1),
            padded_insert(&first, 2),
            padded_insert(&second, 3),
        ];

        // Both writes to the first namespace fit (21 + 549 + 549 = 1119), but the write to the
        // second does not once its namespace entry is counted (1119 + 21 + 549 = 1689).
        let description = description_with_budget(1200);
        let operation =
            BulkWrite::<SummaryBulkWriteResult>::new(&models, None, &description).unwrap();

        let batches = operation.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!((batches[0].offset, batches[0].n_ops), (0, 2));
        assert_eq!((batches[1].offset, batches[1].n_ops), (2, 1));

        let ns_info = |i: usize| &batches[i].command.document_sequences[1].documents;
        assert_eq!(ns_info(0).as_slice(), [rawdoc! { "ns": "db.aaaa" }]);
        assert_eq!(ns_info(1).as_slice(), [rawdoc! { "ns": "db.bbbb" }]);

        // The second batch's write refers to its namespace by batch-local index.
        let ops = &batches[1].command.document_sequences[0].documents;
        assert_eq!(ops[0].get("insert").unwrap().unwrap().as_i32(), Some(0));
    }

    #[test]
    fn command_bodies_carry_options_and_errors_only() {
        let ns = Namespace::new("db", "coll");
        let models = vec![insert(&ns, doc! { "_id": 1 })];
        let description = StreamDescription::default();

        let options = BulkWriteOptions {
            ordered: Some(false),
            ..Default::default()
        };
        let operation =
            BulkWrite::<SummaryBulkWriteResult>::new(&models, Some(&options), &description)
                .unwrap();
        let command = &operation.batches()[0].command;
        assert_eq!(command.name, "bulkWrite");
        assert_eq!(command.target_db, "admin");
        assert_eq!(
            command.body.to_document().unwrap(),
            doc! { "bulkWrite": 1, "ordered": false, "errorsOnly": true }
        );

        let operation =
            BulkWrite::<VerboseBulkWriteResult>::new(&models, None, &description).unwrap();
        assert_eq!(
            operation.batches()[0].command.body.to_document().unwrap(),
            doc! { "bulkWrite": 1, "ordered": true, "errorsOnly": false }
        );
    }

    #[test]
    fn batches_containing_multi_writes_are_not_retryable() {
        let ns = Namespace::new("db", "coll");
        let models = vec![
            insert(&ns, doc! { "_id": 1 }),
            WriteModel::DeleteMany {
                namespace: ns.clone(),
                filter: doc! {},
                collation: None,
                hint: None,
            },
        ];

        let operation =
            BulkWrite::<SummaryBulkWriteResult>::new(&models, None, &StreamDescription::default())
                .unwrap();
        assert_eq!(
            operation.batches()[0].retryability(),
            Retryability::None
        );

        let single_writes = vec![insert(&ns, doc! { "_id": 1 })];
        let operation = BulkWrite::<SummaryBulkWriteResult>::new(
            &single_writes,
            None,
            &StreamDescription::default(),
        )
        .unwrap();
        assert_eq!(
            operation.batches()[0].retryability(),
            Retryability::Write
        );
    }
}
