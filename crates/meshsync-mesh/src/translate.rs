//! Config translator — route records to mesh resources.
//!
//! Every function here is pure. Output is sorted by resource name and all
//! inner lists are ordered by content, so the same input always serializes
//! to the same bytes no matter how the records were ordered.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use meshsync_state::{Backend, ProcessId, RouteWithBackends};

use crate::certs::CertPair;
use crate::collector::compare_paths;
use crate::error::TranslateResult;
use crate::policy::PolicyEdge;
use crate::resources::*;

/// Label carried by workloads, subsets and endpoints naming the routing
/// process they belong to.
pub const PROCESS_LABEL: &str = "meshsync.io/process";

/// Name of the catch-all sidecar resource.
pub const DEFAULT_SIDECAR_NAME: &str = "default";

/// Prefix on resource names and sidecar egress hosts for internal routes.
pub const INTERNAL_NAMESPACE: &str = "internal";

const INTERNAL_RETRY_ATTEMPTS: u32 = 3;
const INTERNAL_RETRY_ON: &str = "5xx";
const INTERNAL_TIMEOUT: &str = "15s";
const TLS_PORT: u32 = 443;

/// Static translator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorConfig {
    /// Name of the ingress gateway external virtual services bind to.
    pub gateway_name: String,
    /// Plaintext ingress port.
    pub gateway_port: u32,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            gateway_name: "meshsync-ingress".to_string(),
            gateway_port: 80,
        }
    }
}

/// Turns route records into the five mesh resource kinds.
#[derive(Debug, Clone, Default)]
pub struct ConfigTranslator {
    config: TranslatorConfig,
}

impl ConfigTranslator {
    pub fn new(config: TranslatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    // ── Gateway ─────────────────────────────────────────────────────

    /// The ingress gateway: plaintext on the configured port for every
    /// host, plus one TLS server per certificate binding.
    pub fn gateways(&self, certs: &[CertPair]) -> TranslateResult<Vec<Resource>> {
        let mut servers = vec![Server {
            port: Port::http(self.config.gateway_port, "http"),
            hosts: vec!["*".to_string()],
            tls: None,
        }];

        let mut port_names: HashSet<String> = HashSet::from(["http".to_string()]);
        for pair in certs {
            let Some(first) = pair.hosts.first() else {
                debug!(cert = %pair.cert_path, "certificate binding has no hosts, skipped");
                continue;
            };
            if !port_names.insert(first.clone()) {
                debug!(host = %first, "duplicate TLS server name, skipped");
                continue;
            }
            servers.push(Server {
                port: Port {
                    number: TLS_PORT,
                    protocol: "https".to_string(),
                    name: first.clone(),
                },
                hosts: pair.hosts.clone(),
                tls: Some(TlsOptions {
                    mode: TlsMode::Simple,
                    server_certificate: pair.cert_path.clone(),
                    private_key: pair.key_path.clone(),
                }),
            });
        }

        Ok(vec![Resource::new(
            ResourceKind::Gateway,
            self.config.gateway_name.clone(),
            &Gateway { servers },
        )?])
    }

    // ── VirtualService ──────────────────────────────────────────────

    /// One virtual service per hostname with one HTTP rule per path.
    pub fn virtual_services(&self, routes: &[RouteWithBackends]) -> TranslateResult<Vec<Resource>> {
        #[derive(Default)]
        struct Rule {
            /// process id → (weight, destination port)
            destinations: BTreeMap<ProcessId, (u32, Option<u32>)>,
        }
        struct Service {
            hostname: String,
            internal: bool,
            rules: BTreeMap<Option<String>, Rule>,
        }

        let mut services: BTreeMap<String, Service> = BTreeMap::new();
        for route in routes {
            let service = services
                .entry(resource_name("service-for", route))
                .or_insert_with(|| Service {
                    hostname: route.hostname.clone(),
                    internal: route.internal,
                    rules: BTreeMap::new(),
                });
            let rule = service.rules.entry(route.path.clone()).or_default();
            let port = route.backends.iter().next().map(|b| u32::from(b.container_port));
            let entry = rule
                .destinations
                .entry(route.process_id.clone())
                .or_insert((route.weight, None));
            entry.1 = entry.1.or(port);
        }

        services
            .into_iter()
            .map(|(name, service)| {
                let mut paths: Vec<Option<String>> = service.rules.keys().cloned().collect();
                paths.sort_by(|a, b| compare_paths(a.as_deref(), b.as_deref()));

                let http = paths
                    .into_iter()
                    .filter_map(|path| {
                        let rule = service.rules.get(&path)?;
                        Some(HttpRoute {
                            matches: path
                                .map(|prefix| HttpMatchRequest {
                                    uri: StringMatch::Prefix(prefix),
                                })
                                .into_iter()
                                .collect(),
                            route: rule
                                .destinations
                                .iter()
                                .map(|(process_id, (weight, port))| HttpRouteDestination {
                                    destination: Destination {
                                        host: service.hostname.clone(),
                                        subset: process_id.clone(),
                                        port: port.map(|number| PortSelector { number }),
                                    },
                                    weight: *weight,
                                })
                                .collect(),
                            retries: service.internal.then(|| HttpRetry {
                                attempts: INTERNAL_RETRY_ATTEMPTS,
                                retry_on: INTERNAL_RETRY_ON.to_string(),
                            }),
                            timeout: service.internal.then(|| INTERNAL_TIMEOUT.to_string()),
                        })
                    })
                    .collect();

                let body = VirtualService {
                    hosts: vec![service.hostname.clone()],
                    gateways: if service.internal {
                        Vec::new()
                    } else {
                        vec![self.config.gateway_name.clone()]
                    },
                    http,
                };
                Resource::new(ResourceKind::VirtualService, name, &body)
            })
            .collect()
    }

    // ── DestinationRule ─────────────────────────────────────────────

    /// One destination rule per hostname with a subset per routing process.
    pub fn destination_rules(&self, routes: &[RouteWithBackends]) -> TranslateResult<Vec<Resource>> {
        let mut rules: BTreeMap<String, (String, BTreeSet<ProcessId>)> = BTreeMap::new();
        for route in routes {
            rules
                .entry(resource_name("rule-for", route))
                .or_insert_with(|| (route.hostname.clone(), BTreeSet::new()))
                .1
                .insert(route.process_id.clone());
        }

        rules
            .into_iter()
            .map(|(name, (host, processes))| {
                let body = DestinationRule {
                    host,
                    subsets: processes
                        .into_iter()
                        .map(|process_id| Subset {
                            labels: process_labels(&process_id),
                            name: process_id,
                        })
                        .collect(),
                };
                Resource::new(ResourceKind::DestinationRule, name, &body)
            })
            .collect()
    }

    // ── ServiceEntry ────────────────────────────────────────────────

    /// One service entry per hostname that has at least one live backend.
    pub fn service_entries(&self, routes: &[RouteWithBackends]) -> TranslateResult<Vec<Resource>> {
        struct Entry {
            hostname: String,
            vip: Option<String>,
            endpoints: BTreeSet<(Backend, ProcessId)>,
        }

        let mut entries: BTreeMap<String, Entry> = BTreeMap::new();
        for route in routes.iter().filter(|r| !r.backends.is_empty()) {
            let entry = entries
                .entry(resource_name("service-entry-for", route))
                .or_insert_with(|| Entry {
                    hostname: route.hostname.clone(),
                    vip: None,
                    endpoints: BTreeSet::new(),
                });
            if route.internal && entry.vip.is_none() {
                entry.vip = route.vip.clone();
            }
            for backend in route.backends.iter() {
                entry
                    .endpoints
                    .insert((backend.clone(), route.process_id.clone()));
            }
        }

        entries
            .into_iter()
            .map(|(name, entry)| {
                let container_ports: BTreeSet<u16> =
                    entry.endpoints.iter().map(|(b, _)| b.container_port).collect();
                let port_name = |port: u16| {
                    if container_ports.len() == 1 {
                        "http".to_string()
                    } else {
                        format!("http-{port}")
                    }
                };

                let body = ServiceEntry {
                    hosts: vec![entry.hostname],
                    addresses: entry.vip.into_iter().collect(),
                    ports: container_ports
                        .iter()
                        .map(|&port| Port::http(u32::from(port), port_name(port)))
                        .collect(),
                    location: Location::MeshInternal,
                    resolution: Resolution::Static,
                    endpoints: entry
                        .endpoints
                        .iter()
                        .map(|(backend, process_id)| Endpoint {
                            address: backend.address.clone(),
                            ports: BTreeMap::from([(
                                port_name(backend.container_port),
                                u32::from(backend.port),
                            )]),
                            labels: process_labels(process_id),
                        })
                        .collect(),
                };
                Resource::new(ResourceKind::ServiceEntry, name, &body)
            })
            .collect()
    }

    // ── Sidecar ─────────────────────────────────────────────────────

    /// A deny-by-default sidecar plus one per policy source, allowing egress
    /// to exactly the internal hostnames of its destinations.
    pub fn sidecars(
        &self,
        routes: &[RouteWithBackends],
        policies: &[PolicyEdge],
    ) -> TranslateResult<Vec<Resource>> {
        let mut internal_hosts: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for route in routes.iter().filter(|r| r.internal) {
            internal_hosts
                .entry(route.process_id.as_str())
                .or_default()
                .insert(route.hostname.as_str());
        }

        let mut egress: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for edge in policies {
            let hosts = egress.entry(edge.source.as_str()).or_default();
            if let Some(reachable) = internal_hosts.get(edge.destination.as_str()) {
                hosts.extend(
                    reachable
                        .iter()
                        .map(|host| format!("{INTERNAL_NAMESPACE}/{host}")),
                );
            }
        }

        let mut resources = vec![Resource::new(
            ResourceKind::Sidecar,
            DEFAULT_SIDECAR_NAME,
            &Sidecar {
                workload_selector: None,
                egress: vec![EgressListener { hosts: Vec::new() }],
            },
        )?];

        for (source, hosts) in egress {
            if source == DEFAULT_SIDECAR_NAME {
                debug!(source, "policy source collides with the default sidecar, skipped");
                continue;
            }
            let body = Sidecar {
                workload_selector: Some(WorkloadSelector {
                    labels: process_labels(source),
                }),
                egress: vec![EgressListener {
                    hosts: hosts.into_iter().collect(),
                }],
            };
            resources.push(Resource::new(ResourceKind::Sidecar, source, &body)?);
        }

        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(resources)
    }
}

/// `meshsync-<what>-<hostname>`, under `internal/` for internal routes.
fn resource_name(what: &str, route: &RouteWithBackends) -> String {
    if route.internal {
        format!("{INTERNAL_NAMESPACE}/meshsync-{what}-{}", route.hostname)
    } else {
        format!("meshsync-{what}-{}", route.hostname)
    }
}

fn process_labels(process_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(PROCESS_LABEL.to_string(), process_id.to_string())])
}
