//! Mining loop orchestration
//!
//! Drives the fetch -> solve -> decode -> submit cycle forever. Failures
//! never terminate the loop; they back off exponentially, and a run of
//! consecutive failures trips a cooldown before mining resumes from the
//! base delay.

use crate::artifact::MinedArtifact;
use crate::client::{ChainClient, PowParamsSource};
use crate::config::Config;
use crate::solver::SolverInvoker;
use crate::submitter::TransactionSubmitter;
use crate::types::AccountAddress;
use crate::utils::ExponentialBackoff;
use crate::{Error, Result};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// The perpetual mining loop
pub struct MiningLoop<P: PowParamsSource, C: ChainClient> {
    params_source: P,
    solver: SolverInvoker,
    submitter: TransactionSubmitter<C>,
    operator: AccountAddress,
    giver: AccountAddress,
    backoff: ExponentialBackoff,
    max_consecutive_failures: u32,
    failure_cooldown: Duration,
    consecutive_failures: u32,
    cycle: u64,
}

impl<P: PowParamsSource, C: ChainClient> MiningLoop<P, C> {
    pub fn new(
        config: &Config,
        params_source: P,
        solver: SolverInvoker,
        submitter: TransactionSubmitter<C>,
    ) -> Result<Self> {
        Ok(Self {
            params_source,
            solver,
            submitter,
            operator: config.operator()?,
            giver: config.giver()?,
            backoff: ExponentialBackoff::new(config.retry_delay, config.max_retry_delay, 2.0),
            max_consecutive_failures: config.max_consecutive_failures,
            failure_cooldown: config.failure_cooldown_duration(),
            consecutive_failures: 0,
            cycle: 0,
        })
    }

    /// Run one complete mining cycle.
    ///
    /// Each cycle fetches fresh parameters, runs one solver attempt against a
    /// cycle-unique artifact path, and submits the decoded result. A failure
    /// at any stage abandons the cycle; nothing within a cycle is retried.
    #[instrument(skip(self), fields(cycle = self.cycle))]
    pub async fn run_cycle(&mut self) -> Result<()> {
        let cycle = self.cycle;
        self.cycle += 1;

        let params = self.params_source.get_pow_params(&self.giver).await?;
        info!(
            "Fetched {} stack entries, solver arguments: {}",
            params.len(),
            params.render()?
        );

        let output = self.solver.output_path(cycle);
        self.solver
            .run(&self.operator, &params, &self.giver, &output)
            .await?;

        let body = MinedArtifact::new(&output).load_body().await?;
        self.submitter.submit(body).await
    }

    /// Record a successful cycle: the failure streak and backoff start over.
    fn after_success(&mut self) {
        self.consecutive_failures = 0;
        self.backoff.reset();
    }

    /// Record a failed cycle and return how long to pause before the next.
    ///
    /// Failures back off exponentially; a streak of
    /// `max_consecutive_failures` trips the breaker, which holds for the
    /// full cooldown and then resumes from the base delay.
    fn after_failure(&mut self, error: &Error) -> Duration {
        self.consecutive_failures += 1;
        warn!(
            category = error.category(),
            retryable = error.is_retryable(),
            failures = self.consecutive_failures,
            "Cycle failed: {}",
            error
        );

        if self.consecutive_failures >= self.max_consecutive_failures {
            error!(
                "{} consecutive failures, cooling down for {:?}",
                self.consecutive_failures, self.failure_cooldown
            );
            self.consecutive_failures = 0;
            self.backoff.reset();
            self.failure_cooldown
        } else {
            Duration::from_millis(self.backoff.next_delay())
        }
    }

    /// Mine forever.
    ///
    /// Never returns; the caller decides when the process stops.
    pub async fn run(&mut self) {
        info!("Mining for giver {}", self.giver);
        loop {
            match self.run_cycle().await {
                Ok(()) => {
                    self.after_success();
                    info!("Cycle complete, continuing");
                }
                Err(e) => {
                    let pause = self.after_failure(&e);
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }
}
