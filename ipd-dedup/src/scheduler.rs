use std::{
    collections::VecDeque,
    mem,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use crossbeam::channel::{bounded, select, Receiver, Sender};
use ipd_core::{CancelToken, Counters, DedupError, Result, TempFile};

use crate::{merge::TwoWayMerge, pool};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeJob {
    /// Position of the pair within its round.
    pub pair: usize,
    pub file_a: TempFile,
    pub file_b: TempFile,
    pub out_file: TempFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub final_file: TempFile,
    pub rounds: usize,
    pub jobs: usize,
}

type JobResult = (usize, Result<TempFile>);

enum Step {
    Sent(bool),
    Received(Option<JobResult>),
}

/// Merges chunk files pairwise, round by round, until one file is left.
/// An odd file out is carried into the next round untouched.
pub struct MergeScheduler {
    workers: usize,
    dir: PathBuf,
    counters: Arc<Counters>,
    cancel: CancelToken,
    clean_up: bool,
}

impl MergeScheduler {
    pub fn new(workers: usize, dir: &Path, counters: Arc<Counters>, cancel: CancelToken) -> Self {
        Self {
            workers: workers.max(1),
            dir: dir.to_path_buf(),
            counters,
            cancel,
            clean_up: true,
        }
    }

    /// Keep merge inputs on disk instead of deleting them after each job.
    pub fn keep_inputs(mut self) -> Self {
        self.clean_up = false;
        self
    }

    pub fn merge_all(&self, mut files: Vec<TempFile>) -> Result<MergeOutcome> {
        if files.len() <= 1 {
            return match files.pop() {
                Some(final_file) => Ok(MergeOutcome {
                    final_file,
                    rounds: 0,
                    jobs: 0,
                }),
                None => Err(DedupError::Configuration(
                    "merge scheduler needs at least one file".to_string(),
                )),
            };
        }

        let (job_tx, job_rx) = bounded::<MergeJob>(self.workers * 2);
        let (result_tx, result_rx) = bounded::<JobResult>(self.workers * 2);

        thread::scope(|scope| {
            let workers: Vec<_> = (0..self.workers)
                .map(|id| {
                    let jobs = job_rx.clone();
                    let results = result_tx.clone();
                    scope.spawn(move || self.work(id, jobs, results))
                })
                .collect();
            drop(job_rx);
            drop(result_tx);

            // Both channel ends are consumed here, so workers see the queues
            // close as soon as the rounds finish or fail.
            let outcome = self.drive(files, job_tx, result_rx);
            if outcome.is_err() {
                self.cancel.cancel();
            }

            let mut failure = None;
            for handle in workers {
                if let Err(err) = pool::join(handle, "merge worker") {
                    pool::record_failure(&mut failure, err);
                }
            }
            match (outcome, failure) {
                (Ok(outcome), None) => Ok(outcome),
                (outcome, mut failure) => {
                    if let Err(err) = outcome {
                        pool::record_failure(&mut failure, err);
                    }
                    pool::purge_run_files(&self.dir);
                    Err(failure.unwrap_or(DedupError::Cancelled))
                }
            }
        })
    }

    fn drive(
        &self,
        mut files: Vec<TempFile>,
        jobs: Sender<MergeJob>,
        results: Receiver<JobResult>,
    ) -> Result<MergeOutcome> {
        let mut round = 0;
        let mut next_index = 0;

        while files.len() > 1 {
            round += 1;
            let (pending, carried) = self.pair_up(mem::take(&mut files), round, &mut next_index);
            let dispatched = pending.len();
            log::info!(
                "merge round {}: {} job(s){}",
                round,
                dispatched,
                if carried.is_some() { ", 1 file carried forward" } else { "" }
            );

            let outputs = self.run_round(pending, &jobs, &results)?;
            files = carried.into_iter().chain(outputs).collect();
        }

        let final_file = files.pop().ok_or(DedupError::Cancelled)?;
        Ok(MergeOutcome {
            final_file,
            rounds: round,
            jobs: next_index,
        })
    }

    fn pair_up(
        &self,
        files: Vec<TempFile>,
        round: usize,
        next_index: &mut usize,
    ) -> (VecDeque<MergeJob>, Option<TempFile>) {
        let mut pending = VecDeque::with_capacity(files.len() / 2);
        let mut files = files.into_iter();
        loop {
            match (files.next(), files.next()) {
                (Some(file_a), Some(file_b)) => {
                    pending.push_back(MergeJob {
                        pair: pending.len(),
                        file_a,
                        file_b,
                        out_file: TempFile::merged(&self.dir, round, *next_index),
                    });
                    *next_index += 1;
                }
                (leftover, _) => return (pending, leftover),
            }
        }
    }

    /// Feeds one round's jobs and collects one result per job actually sent.
    ///
    /// Sending and receiving are interleaved so a round larger than both
    /// queue bounds cannot wedge workers blocked on a full result queue.
    fn run_round(
        &self,
        mut pending: VecDeque<MergeJob>,
        jobs: &Sender<MergeJob>,
        results: &Receiver<JobResult>,
    ) -> Result<Vec<TempFile>> {
        let mut outputs: Vec<Option<TempFile>> = vec![None; pending.len()];
        let mut sent = 0;
        let mut received = 0;
        let mut failure: Option<DedupError> = None;

        while received < sent || (failure.is_none() && !pending.is_empty()) {
            let next = if failure.is_none() {
                pending.front().cloned()
            } else {
                None
            };
            let step = match next {
                Some(job) => select! {
                    send(jobs, job) -> res => Step::Sent(res.is_ok()),
                    recv(results) -> message => Step::Received(message.ok()),
                },
                None => Step::Received(results.recv().ok()),
            };
            let message = match step {
                Step::Sent(true) => {
                    pending.pop_front();
                    sent += 1;
                    continue;
                }
                Step::Sent(false) | Step::Received(None) => return Err(DedupError::Cancelled),
                Step::Received(Some(message)) => message,
            };

            received += 1;
            let (pair, result) = message;
            match result {
                Ok(file) => outputs[pair] = Some(file),
                Err(err) => {
                    self.cancel.cancel();
                    pool::record_failure(&mut failure, err);
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        Ok(outputs.into_iter().flatten().collect())
    }

    fn work(&self, id: usize, jobs: Receiver<MergeJob>, results: Sender<JobResult>) -> Result<()> {
        let engine = TwoWayMerge::new(&self.counters, &self.cancel).clean_up(self.clean_up);
        for job in jobs.iter() {
            let result = self
                .cancel
                .check()
                .and_then(|()| {
                    engine.merge(&job.file_a.path, &job.file_b.path, &job.out_file.path)
                })
                .map(|stats| {
                    log::info!(
                        "worker {} merged {} + {} -> {} ({} values, {} duplicates removed)",
                        id,
                        file_name(&job.file_a),
                        file_name(&job.file_b),
                        file_name(&job.out_file),
                        stats.written,
                        stats.duplicates
                    );
                    job.out_file.clone()
                });
            if let Err(err) = &result {
                if !err.is_cancelled() {
                    self.cancel.cancel();
                }
            }
            if results.send((job.pair, result)).is_err() {
                break;
            }
        }
        Ok(())
    }
}

fn file_name(file: &TempFile) -> String {
    file.path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
