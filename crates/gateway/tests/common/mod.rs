#![allow(dead_code)]

use async_trait::async_trait;
use compute_gateway::{
    compute::{
        InstanceStatus, InstanceSummary, OperationHandle, OperationSnapshot, OperationStatus,
        ResourceClient,
    },
    config::{Config, LifecycleConfig, WaitMode},
    gateway::ToolGateway,
    Error, Result,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory provider. Instance polls replay a scripted status sequence,
/// repeating the last entry once exhausted.
#[derive(Default)]
pub struct FakeCompute {
    instances: Mutex<Vec<InstanceSummary>>,
    status_script: Mutex<HashMap<String, VecDeque<InstanceStatus>>>,
    pub calls: Mutex<Vec<String>>,
    next_op: Mutex<u32>,
    operation_error: Mutex<Option<(i64, String)>>,
    operation_outage: Mutex<Option<u16>>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(self, name: &str, status: InstanceStatus) -> Self {
        self.instances.lock().unwrap().push(InstanceSummary {
            name: name.to_string(),
            status,
        });
        self
    }

    pub fn with_status_script(self, name: &str, script: &[InstanceStatus]) -> Self {
        self.status_script
            .lock()
            .unwrap()
            .insert(name.to_string(), script.iter().copied().collect());
        self
    }

    /// Operations finish DONE carrying this provider error.
    pub fn with_failing_operations(self, code: i64, message: &str) -> Self {
        *self.operation_error.lock().unwrap() = Some((code, message.to_string()));
        self
    }

    /// Operation polls fail with this HTTP status.
    pub fn with_operation_outage(self, status: u16) -> Self {
        *self.operation_outage.lock().unwrap() = Some(status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn operation(&self) -> OperationHandle {
        let mut next = self.next_op.lock().unwrap();
        *next += 1;
        OperationHandle::new(format!("operation-{}", *next), OperationStatus::Pending)
    }
}

#[async_trait]
impl ResourceClient for FakeCompute {
    async fn list_instances(
        &self,
        project: &str,
        zone: &str,
    ) -> Result<Vec<InstanceSummary>> {
        self.log(format!("list {}/{}", project, zone));
        Ok(self.instances.lock().unwrap().clone())
    }

    async fn start_instance(
        &self,
        _project: &str,
        _zone: &str,
        name: &str,
    ) -> Result<OperationHandle> {
        self.log(format!("start {}", name));
        Ok(self.operation())
    }

    async fn stop_instance(
        &self,
        _project: &str,
        _zone: &str,
        name: &str,
    ) -> Result<OperationHandle> {
        self.log(format!("stop {}", name));
        Ok(self.operation())
    }

    async fn get_operation(
        &self,
        _project: &str,
        _zone: &str,
        id: &str,
    ) -> Result<OperationSnapshot> {
        self.log(format!("operation {}", id));
        if let Some(status) = *self.operation_outage.lock().unwrap() {
            return Err(Error::Provider {
                status,
                message: "backend unavailable".to_string(),
            });
        }
        Ok(match &*self.operation_error.lock().unwrap() {
            Some((code, message)) => OperationSnapshot::failed(*code, message.clone()),
            None => OperationSnapshot::new(OperationStatus::Done),
        })
    }

    async fn get_instance(
        &self,
        _project: &str,
        _zone: &str,
        name: &str,
    ) -> Result<InstanceStatus> {
        self.log(format!("instance {}", name));
        let mut scripts = self.status_script.lock().unwrap();
        let status = match scripts.get_mut(name) {
            Some(script) if script.len() > 1 => {
                script.pop_front().unwrap_or(InstanceStatus::Unknown)
            }
            Some(script) => script.front().copied().unwrap_or(InstanceStatus::Unknown),
            None => InstanceStatus::Unknown,
        };
        Ok(status)
    }
}

/// Configuration with millisecond poll intervals so tests finish quickly.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.lifecycle = LifecycleConfig {
        operation_poll_interval: Duration::from_millis(1),
        operation_poll_max_attempts: 5,
        instance_poll_interval: Duration::from_millis(1),
        instance_poll_max_attempts: 3,
        start_wait: WaitMode::Converge,
        stop_wait: WaitMode::Submit,
    };
    config
}

pub fn gateway_with(fake: Arc<FakeCompute>, config: &Config) -> Arc<ToolGateway> {
    Arc::new(ToolGateway::new(fake, config))
}
