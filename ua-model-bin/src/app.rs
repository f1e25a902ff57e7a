use opcua::types::Variant;
use std::{sync::Arc, time::Duration};
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio::{signal::ctrl_c, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};
use ua_model_common::{settings::Simulation, Settings};
use ua_model_core::{
    method::{CallRequest, JobQueue, MethodDispatcher, ServiceContext, WorkerPool},
    AddressSpace, UaObject,
};
use ua_model_demo::{
    identifiers::{self as ids, id},
    BoilerDemo,
};
use ua_model_error::{ModelError, ModelResult};

const SET_POINT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Application {
    space: Arc<AddressSpace>,
    demo: Arc<BoilerDemo>,
    pool: Arc<WorkerPool>,
    dispatcher: MethodDispatcher,
    simulation: Option<JoinHandle<()>>,
    shutdown_token: CancellationToken,
}

impl Application {
    /// Build the address space and the demo model, then start serving
    /// method calls.
    #[instrument(name = "start-app", skip_all)]
    pub async fn start(settings: Settings) -> ModelResult<Self> {
        let mut app = Self::build(&settings).inspect_err(|e| {
            if e.is_fatal() {
                error!(error = %e, "Information model is inconsistent, aborting startup");
            }
        })?;
        if settings.simulation.enabled {
            app.start_simulation(&settings.simulation).await;
        }
        app.log_summary();
        Ok(app)
    }

    fn build(settings: &Settings) -> ModelResult<Self> {
        let space = Arc::new(AddressSpace::new()?);
        let demo = Arc::new(BoilerDemo::register(
            Arc::clone(&space),
            &settings.address_space.namespace_uri,
        )?);
        for name in &settings.address_space.boilers {
            demo.create_boiler(name)?;
        }
        for name in &settings.address_space.machines {
            demo.create_machine(name)?;
        }

        let shutdown_token = CancellationToken::new();
        let pool = WorkerPool::start(&settings.worker_pool, shutdown_token.child_token());
        let queue: Arc<dyn JobQueue> = pool.clone();
        let dispatcher = MethodDispatcher::new(Arc::clone(&space), queue);
        info!("Method dispatcher ready");

        Ok(Self {
            space,
            demo,
            pool,
            dispatcher,
            simulation: None,
            shutdown_token,
        })
    }

    /// Send the configured set points to every boiler, then step the
    /// simulation on a fixed interval until shutdown.
    async fn start_simulation(&mut self, config: &Simulation) {
        let namespace = self.demo.namespace();
        for boiler in self.demo.boilers() {
            let calls = [
                (ids::BOILER_FILL, config.fill_set_point),
                (ids::BOILER_HEAT, config.temperature_set_point),
            ];
            for (method, set_point) in calls {
                let request = CallRequest {
                    object_id: boiler.node_id().clone(),
                    method_id: id(namespace, method),
                    input_arguments: vec![Variant::Double(set_point)],
                };
                let context = ServiceContext {
                    timeout: Some(SET_POINT_TIMEOUT),
                    ..Default::default()
                };
                match self.dispatcher.call(context, request).await {
                    Ok(result) if result.status.is_good() => {
                        debug!(boiler = %boiler.node_id(), method, set_point, "Set point applied")
                    }
                    Ok(result) => warn!(
                        boiler = %boiler.node_id(),
                        method,
                        status = %result.status,
                        "Set point rejected"
                    ),
                    Err(e) => warn!(
                        boiler = %boiler.node_id(),
                        method,
                        error = %e,
                        "Set point call failed"
                    ),
                }
            }
        }

        let demo = Arc::clone(&self.demo);
        let token = self.shutdown_token.child_token();
        let period = Duration::from_millis(config.interval_ms.max(1));
        let rate = config.rate;
        self.simulation = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let stepped = demo.simulate_step(rate);
                        trace!(stepped, "Simulation tick");
                    }
                }
            }
            debug!("Simulation stopped");
        }));
        info!(interval_ms = config.interval_ms, rate, "Boiler simulation started");
    }

    fn log_summary(&self) {
        let boilers = self.space.objects_of_type(&self.demo.boiler_type());
        let machines = self.space.objects_of_type(&self.demo.machine_type());
        info!(
            nodes = self.space.node_count(),
            namespaces = self.space.namespaces().len(),
            types = self.space.registry().created_types().len(),
            boilers = boilers.len(),
            machines = machines.len(),
            folder = %self.demo.folder(),
            "Address space ready"
        );
        for object in boilers.iter().chain(machines.iter()) {
            let instance = object.instance();
            debug!(
                node_id = %instance.node_id(),
                children = instance.children().len(),
                methods = instance.methods().len(),
                "Instance"
            );
        }
    }

    /// Wait for ctrl-c (or SIGTERM on unix).
    pub async fn wait_for_shutdown_signal(&self) -> ModelResult<()> {
        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            tokio::select! {
                result = ctrl_c() => {
                    result?;
                    info!("Received ctrl-c signal");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM signal");
                }
                _ = self.shutdown_token.cancelled() => {}
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                result = ctrl_c() => {
                    result?;
                    info!("Received ctrl-c signal");
                }
                _ = self.shutdown_token.cancelled() => {}
            }
        }
        Ok(())
    }

    /// Stop the simulation and the pool, then clear the demo namespace so
    /// every type template is torn down.
    #[instrument(name = "graceful-shutdown", skip_all)]
    pub async fn shutdown(self) -> ModelResult<()> {
        info!("Starting graceful shutdown...");
        self.shutdown_token.cancel();
        if let Some(simulation) = self.simulation {
            simulation.await?;
        }
        self.pool.shutdown().await?;

        let removed = self.demo.clear().map_err(|e| {
            ModelError::ShutdownError(format!("clearing namespace {}: {e}", self.demo.namespace()))
        })?;
        info!(removed, "Graceful shutdown completed");
        Ok(())
    }
}
