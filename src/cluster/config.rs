use anyhow::Context;

/// Protocol port; used when `ADDRESS` does not carry an explicit port.
pub const DEFAULT_PORT: u16 = 13800;

/// Runtime configuration drawn from the environment at process start.
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoints of the initial cluster membership, in declaration order.
    pub view: Vec<String>,
    /// This node's own endpoint as peers address it.
    pub address: String,
    /// Replicas per shard. When set, the shard replica map is maintained
    /// across view changes.
    pub repl_factor: Option<usize>,
}

impl Config {
    /// Reads `VIEW`, `ADDRESS` and `REPL_FACTOR`. The first two are required.
    pub fn from_env() -> anyhow::Result<Self> {
        let view = std::env::var("VIEW").context("VIEW must be set")?;
        let address = std::env::var("ADDRESS").context("ADDRESS must be set")?;
        let repl_factor = std::env::var("REPL_FACTOR")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|&r| r > 0);

        let nodes = parse_view(&view);
        anyhow::ensure!(!nodes.is_empty(), "VIEW must name at least one node");

        Ok(Self {
            view: nodes,
            address,
            repl_factor,
        })
    }

    /// The port this node listens on, taken from its own endpoint.
    pub fn listen_port(&self) -> u16 {
        self.address
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// The first node of the view coordinates cluster setup.
    pub fn is_setup_coordinator(&self) -> bool {
        self.view.first() == Some(&self.address)
    }
}

/// Splits a comma-separated endpoint list, dropping empty entries.
pub fn parse_view(view: &str) -> Vec<String> {
    view.split(',')
        .map(|node| node.trim().to_string())
        .filter(|node| !node.is_empty())
        .collect()
}
