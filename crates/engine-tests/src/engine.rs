#[cfg(test)]
mod tests {
    use crate::{
        BUSINESS_DATE, Workspace,
        utils::{
            PostTrade, Trade, booked, read_work, trades_csv, wait_terminal, work_file_exists,
            write_inbound,
        },
    };
    use connectors::file::{
        ChecksumAlgorithm, FileCopy, FileItemReader, FileItemWriter, FileLocation,
        FileObjectModel, copy::COPY_BYTES_KEY,
    };
    use engine_processing::StepBuilder;
    use engine_runtime::{Job, JobBuilder};
    use model::{
        error::ErrorCode,
        execution::{params::JobParameters, status::BatchStatus},
    };
    use std::{collections::HashSet, sync::atomic::Ordering, time::Duration};
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    const LEDGER: &str = "ledger_20240301.csv";

    fn ledger_job(ws: &Workspace, processor: PostTrade, chunk_size: usize) -> Job {
        let trades = FileObjectModel::new(ws.inbound.clone(), "trade_{date,yyyyMMdd}.csv");
        let ledger = FileObjectModel::new(ws.work.clone(), "ledger_{date,yyyyMMdd}.csv")
            .with_checksum(ChecksumAlgorithm::Md5);

        JobBuilder::new("daily_ledger")
            .step(
                StepBuilder::new("post")
                    .reader(FileItemReader::<Trade>::new(trades))
                    .processor(processor)
                    .writer(FileItemWriter::new(ledger))
                    .chunk_size(chunk_size)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    /// Trade ids in the ledger; panics on a duplicate.
    fn ledger_ids(ws: &Workspace) -> Vec<u32> {
        let content = read_work(ws, LEDGER);
        let mut seen = HashSet::new();
        content
            .lines()
            .skip(1)
            .map(|line| {
                let id: u32 = line.split(',').next().unwrap().parse().unwrap();
                assert!(seen.insert(id), "trade {id} written twice");
                id
            })
            .collect()
    }

    fn params() -> JobParameters {
        JobParameters::new().with("date", BUSINESS_DATE)
    }

    // Scenario: processing trade 17 fails on the first run; the process is
    // then "restarted" with a fresh engine over the same execution store.
    // Expected Outcome:
    // - The first run commits trades 1..=15 and ends FAILED.
    // - The restart resumes at trade 16 and appends to the same ledger.
    // - No trade is written twice and the sidecar covers the final file.
    #[traced_test]
    #[tokio::test]
    async fn restart_after_reopen_resumes_ledger() {
        let ws = Workspace::new();
        write_inbound(&ws, "trade_20240301.csv", &trades_csv(30));
        let processor = PostTrade::failing_once_on(17);

        let failed = {
            let engine = ws.engine();
            engine
                .register(ledger_job(&ws, processor.clone(), 5))
                .unwrap();
            let err = engine
                .start(&CancellationToken::new(), "daily_ledger", params())
                .await
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::Process);

            let failed = engine
                .job_executions("daily_ledger")
                .await
                .unwrap()
                .pop()
                .unwrap();
            let step = engine
                .step_executions(&failed.id)
                .await
                .unwrap()
                .pop()
                .unwrap();
            assert_eq!(step.status(), BatchStatus::Failed);
            assert_eq!(step.commit_count(), 3);
            assert_eq!(step.read_count(), 15);
            failed
        };
        assert_eq!(ledger_ids(&ws).len(), booked(15));

        let engine = ws.engine();
        engine.register(ledger_job(&ws, processor, 5)).unwrap();
        let restarted = engine
            .restart(&CancellationToken::new(), &failed.id)
            .await
            .unwrap();
        assert_eq!(restarted.status(), BatchStatus::Completed);
        assert_eq!(restarted.restart_of.as_ref(), Some(&failed.id));

        let step = engine
            .step_executions(&restarted.id)
            .await
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(step.read_count(), 15);

        let expected: Vec<u32> = (1..=30).filter(|id| id % 5 != 0).collect();
        assert_eq!(ledger_ids(&ws), expected);

        let ledger = read_work(&ws, LEDGER);
        let sidecar = read_work(&ws, "ledger_20240301.csv.md5");
        assert_eq!(sidecar, ChecksumAlgorithm::Md5.digest(ledger.as_bytes()));
    }

    // Scenario: a long ledger run is stopped from outside while it is working
    // through its chunks, then restarted.
    // Expected Outcome:
    // - The stopped run ends STOPPED after finishing its current chunk.
    // - The restart completes the ledger without gaps or duplicates.
    // - Only the completed ledger gets a checksum sidecar.
    #[traced_test]
    #[tokio::test]
    async fn stopped_run_restarts_where_it_stopped() {
        let ws = Workspace::new();
        write_inbound(&ws, "trade_20240301.csv", &trades_csv(200));
        let processor = PostTrade::slow(Duration::from_millis(2));

        let engine = ws.engine();
        engine
            .register(ledger_job(&ws, processor.clone(), 10))
            .unwrap();

        let id = engine
            .start_async(&CancellationToken::new(), "daily_ledger", params())
            .await
            .unwrap();
        while processor.seen.load(Ordering::SeqCst) < 25 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(engine.stop(&id));

        let stopped = wait_terminal(&engine, &id).await;
        assert_eq!(stopped.status(), BatchStatus::Stopped);
        let written = ledger_ids(&ws).len();
        assert!(written < booked(200));
        assert!(!work_file_exists(&ws, "ledger_20240301.csv.md5"));

        let restarted = engine
            .restart(&CancellationToken::new(), &id)
            .await
            .unwrap();
        assert_eq!(restarted.status(), BatchStatus::Completed);

        let expected: Vec<u32> = (1..=200).filter(|id| id % 5 != 0).collect();
        assert_eq!(ledger_ids(&ws), expected);

        let sidecar = read_work(&ws, "ledger_20240301.csv.md5");
        let ledger = read_work(&ws, LEDGER);
        assert_eq!(sidecar, ChecksumAlgorithm::Md5.digest(ledger.as_bytes()));
    }

    // Scenario: an engine records a finished run and is dropped; a new engine
    // opens the same store.
    // Expected Outcome: the run, its steps and their execution contexts are
    // all visible to the new engine.
    #[traced_test]
    #[tokio::test]
    async fn history_survives_engine_reopen() {
        let ws = Workspace::new();
        write_inbound(&ws, "trade_20240301.csv", &trades_csv(4));

        let copy = || {
            JobBuilder::new("fetch")
                .step(
                    StepBuilder::new("copy")
                        .tasklet(FileCopy::new(
                            FileLocation::new(ws.inbound.clone(), "trade_{date,yyyyMMdd}.csv"),
                            FileLocation::new(ws.work.clone(), "trade_{date,yyyyMMdd}.csv"),
                        ))
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap()
        };

        let id = {
            let engine = ws.engine();
            engine.register(copy()).unwrap();
            engine
                .start(&CancellationToken::new(), "fetch", params())
                .await
                .unwrap()
                .id
        };

        let engine = ws.engine();
        let executions = engine.job_executions("fetch").await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].id, id);
        assert_eq!(executions[0].status(), BatchStatus::Completed);

        let step = engine.step_executions(&id).await.unwrap().pop().unwrap();
        assert_eq!(step.status(), BatchStatus::Completed);
        assert_eq!(
            step.context().get_int(COPY_BYTES_KEY, 0),
            trades_csv(4).len() as i64
        );

        engine.register(copy()).unwrap();
        let err = engine
            .restart(&CancellationToken::new(), &id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Configuration);
    }
}
