//! Bridge runtime.
//!
//! A [`Bridge`] wires a resolved [`Translator`] to a CAN link and a
//! Modbus link. Each MB2CAN rule whose source resource declares a
//! positive polling period gets its own interval task (period 0 disables
//! polling, as in the schema convention); received CAN frames are matched
//! by id against the CAN2MB rules and extracted into a persistent
//! per-resource register image before being written out, so bit-level
//! merges survive across frames.
//!
//! The translator is replaced wholesale by [`Bridge::swap_translator`];
//! running tasks pick up the new plan on their next cycle and never see a
//! half-updated schema.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::core::data::CanFrameData;
use crate::core::error::{BridgeError, Result};
use crate::core::traits::{
    BridgeEvent, BridgeEventReceiver, BridgeEventSender, BusSide, CanLink, ConnectionState,
    ModbusLink,
};
use crate::gateway::config::BridgeConfig;
use crate::mapping::{MappingRule, RuleDirection, Translator};
use crate::schema::model::{CanDirection, ModbusFunction, ModbusResourceSpec};

type SharedTranslator = Arc<RwLock<Arc<Translator>>>;

fn current(translator: &SharedTranslator) -> Arc<Translator> {
    match translator.read() {
        Ok(guard) => Arc::clone(&guard),
        Err(poisoned) => Arc::clone(&poisoned.into_inner()),
    }
}

/// The running CAN ⇄ Modbus bridge.
pub struct Bridge<C: CanLink, M: ModbusLink> {
    translator: SharedTranslator,
    can: Arc<Mutex<C>>,
    modbus: Arc<Mutex<M>>,
    event_tx: BridgeEventSender,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
    images: Arc<DashMap<String, Vec<u16>>>,
}

impl<C, M> Bridge<C, M>
where
    C: CanLink + 'static,
    M: ModbusLink + 'static,
{
    /// Create a bridge from a resolved plan and the two links.
    pub fn new(translator: Translator, can: C, modbus: M, config: &BridgeConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_buffer);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            translator: Arc::new(RwLock::new(Arc::new(translator))),
            can: Arc::new(Mutex::new(can)),
            modbus: Arc::new(Mutex::new(modbus)),
            event_tx,
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
            images: Arc::new(DashMap::new()),
        }
    }

    /// Subscribe to runtime events.
    pub fn subscribe(&self) -> BridgeEventReceiver {
        self.event_tx.subscribe()
    }

    /// Snapshot of the current translation plan.
    pub fn translator(&self) -> Arc<Translator> {
        current(&self.translator)
    }

    /// Replace the whole translation plan atomically.
    ///
    /// Polling tasks keep the period they were started with; everything
    /// else (endpoints, pairs, scales) follows the new plan from the next
    /// cycle on.
    pub fn swap_translator(&self, translator: Translator) {
        let rules = translator.rules().len();
        match self.translator.write() {
            Ok(mut guard) => *guard = Arc::new(translator),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(translator),
        }
        tracing::info!("translation plan replaced ({} rules)", rules);
    }

    /// Open both links and start the polling and dispatch tasks.
    pub async fn start(&mut self) -> Result<()> {
        self.can.lock().await.open().await?;
        let _ = self.event_tx.send(BridgeEvent::LinkStateChanged(
            BusSide::Can,
            ConnectionState::Connected,
        ));

        self.modbus.lock().await.open().await?;
        let _ = self.event_tx.send(BridgeEvent::LinkStateChanged(
            BusSide::Modbus,
            ConnectionState::Connected,
        ));

        let translator = current(&self.translator);
        for (index, rule) in translator.rules().iter().enumerate() {
            if rule.direction != RuleDirection::Mb2Can {
                continue;
            }
            let resource = translator.resource(rule)?;
            if !resource.function.is_read() || resource.period_ms == 0 {
                continue;
            }
            let message = translator.message(rule)?;
            if message.direction == CanDirection::Net2Int {
                tracing::debug!(
                    "message '{}' tagged NET2INT is transmitted by rule {}",
                    message.name,
                    rule.label()
                );
            }
            let task = self.spawn_poll_task(index, Duration::from_millis(resource.period_ms.into()));
            self.tasks.push(task);
        }

        let rx_task = self.spawn_rx_task();
        self.tasks.push(rx_task);

        tracing::info!("bridge started with {} tasks", self.tasks.len());
        Ok(())
    }

    /// Stop all tasks and close both links.
    pub async fn stop(&mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }

        self.can.lock().await.close().await?;
        let _ = self.event_tx.send(BridgeEvent::LinkStateChanged(
            BusSide::Can,
            ConnectionState::Disconnected,
        ));

        self.modbus.lock().await.close().await?;
        let _ = self.event_tx.send(BridgeEvent::LinkStateChanged(
            BusSide::Modbus,
            ConnectionState::Disconnected,
        ));

        tracing::info!("bridge stopped");
        Ok(())
    }

    fn spawn_poll_task(&self, rule_index: usize, period: Duration) -> JoinHandle<()> {
        let translator = Arc::clone(&self.translator);
        let can = Arc::clone(&self.can);
        let modbus = Arc::clone(&self.modbus);
        let event_tx = self.event_tx.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {
                        let plan = current(&translator);
                        let Some(rule) = plan.rules().get(rule_index) else { continue };
                        if rule.direction != RuleDirection::Mb2Can {
                            continue;
                        }
                        if let Err(e) = poll_cycle(&plan, rule, &can, &modbus, &event_tx).await {
                            tracing::warn!("poll {} failed: {}", rule.label(), e);
                            let _ = event_tx.send(BridgeEvent::Error(format!(
                                "poll {}: {}",
                                rule.label(),
                                e
                            )));
                        }
                    }
                }
            }
        })
    }

    fn spawn_rx_task(&self) -> JoinHandle<()> {
        let translator = Arc::clone(&self.translator);
        let can = Arc::clone(&self.can);
        let modbus = Arc::clone(&self.modbus);
        let event_tx = self.event_tx.clone();
        let images = Arc::clone(&self.images);
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut frames = can.lock().await.subscribe();
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    frame = frames.recv() => match frame {
                        Ok(frame) => {
                            let _ = event_tx.send(BridgeEvent::FrameReceived(frame));
                            let plan = current(&translator);
                            dispatch_frame(&plan, frame, &modbus, &images, &event_tx).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("frame receiver lagged by {}", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }
}

async fn poll_cycle<C: CanLink, M: ModbusLink>(
    plan: &Translator,
    rule: &MappingRule,
    can: &Mutex<C>,
    modbus: &Mutex<M>,
    event_tx: &BridgeEventSender,
) -> Result<()> {
    let resource = plan.resource(rule)?;
    let slave = plan.modbus_schema().rtu.slave_id;

    let regs = {
        let link = modbus.lock().await;
        link.read_holding(slave, resource.address, resource.count)
            .await?
    };
    let frame = plan.build_can_frame(rule, &regs)?;
    can.lock().await.send_frame(frame).await?;

    tracing::debug!("poll {}: sent {}", rule.label(), frame);
    let _ = event_tx.send(BridgeEvent::FrameSent {
        rule: rule.label(),
        frame,
    });
    Ok(())
}

async fn dispatch_frame<M: ModbusLink>(
    plan: &Translator,
    frame: CanFrameData,
    modbus: &Mutex<M>,
    images: &DashMap<String, Vec<u16>>,
    event_tx: &BridgeEventSender,
) {
    for rule in plan.rules() {
        if rule.direction != RuleDirection::Can2Mb {
            continue;
        }
        let Ok(message) = plan.message(rule) else { continue };
        if message.id != frame.id() {
            continue;
        }
        if message.direction == CanDirection::Int2Net {
            tracing::debug!(
                "message '{}' tagged INT2NET arrived from the bus",
                message.name
            );
        }
        let Ok(resource) = plan.resource(rule) else { continue };

        // Work on a copy of the resource image; only a successful
        // extraction replaces it, a failed one is discarded whole.
        let mut regs = images
            .get(resource.name.as_str())
            .map(|r| r.value().clone())
            .unwrap_or_default();
        regs.resize(resource.count as usize, 0);

        match plan.extract_registers(rule, frame.data(), &mut regs) {
            Ok(()) => {
                images.insert(resource.name.clone(), regs.clone());
                let slave = plan.modbus_schema().rtu.slave_id;
                match write_resource(modbus, slave, resource, &regs).await {
                    Ok(written) => {
                        tracing::debug!(
                            "rule {}: wrote {} registers to '{}'",
                            rule.label(),
                            written.len(),
                            resource.name
                        );
                        let _ = event_tx.send(BridgeEvent::RegistersWritten {
                            rule: rule.label(),
                            resource: resource.name.clone(),
                            registers: written,
                        });
                    }
                    Err(e) => {
                        tracing::warn!("rule {}: write to '{}' failed: {}", rule.label(), resource.name, e);
                        let _ = event_tx.send(BridgeEvent::Error(format!(
                            "write {}: {}",
                            rule.label(),
                            e
                        )));
                    }
                }
            }
            Err(e) => {
                tracing::warn!("rule {}: extraction failed: {}", rule.label(), e);
                let _ = event_tx.send(BridgeEvent::Error(format!(
                    "extract {}: {}",
                    rule.label(),
                    e
                )));
            }
        }
    }
}

/// Write a register image out through the resource's declared function.
async fn write_resource<M: ModbusLink>(
    modbus: &Mutex<M>,
    slave: u8,
    resource: &ModbusResourceSpec,
    regs: &[u16],
) -> Result<Vec<u16>> {
    match resource.function {
        ModbusFunction::WriteSingle => {
            let value = regs
                .first()
                .copied()
                .ok_or_else(|| BridgeError::translation("empty register image"))?;
            modbus
                .lock()
                .await
                .write_single(slave, resource.address, value)
                .await?;
            Ok(vec![value])
        }
        ModbusFunction::WriteMultiple => {
            let count = resource.count as usize;
            if regs.len() < count {
                return Err(BridgeError::translation(format!(
                    "register image of {} shorter than resource count {}",
                    regs.len(),
                    count
                )));
            }
            modbus
                .lock()
                .await
                .write_multiple(slave, resource.address, &regs[..count])
                .await?;
            Ok(regs[..count].to_vec())
        }
        ModbusFunction::ReadHolding => Err(BridgeError::unsupported(format!(
            "resource '{}' is not writable",
            resource.name
        ))),
    }
}
