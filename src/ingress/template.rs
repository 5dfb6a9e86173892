//! Rendering of the Traefik compose file and its dynamic TLS
//! configuration.

use docker_compose_types::{
    Command as ComposeCommand, Compose, ComposeNetwork, ComposeNetworks, Labels, MapOrEmpty,
    NetworkSettings, Ports, Service, Services, Volumes,
};
use indexmap::IndexMap;
use serde::Serialize;

use super::{IngressMode, NETWORK_NAME, SERVICE_NAME};
use crate::config::Layout;
use crate::error::DeployResult;

const IMAGE: &str = "traefik:v3.1";
const DOCKER_SOCKET: &str = "/var/run/docker.sock:/var/run/docker.sock:ro";
const ACME_RESOLVER: &str = "masterBuilder";
const LETSENCRYPT_MOUNT: &str = "/letsencrypt";
const CERT_IN_CONTAINER: &str = "/etc/traefik/ssl/default.crt";
const KEY_IN_CONTAINER: &str = "/etc/traefik/ssl/default.key";
const DYNAMIC_DIR_IN_CONTAINER: &str = "/etc/traefik/dynamic/";

/// Render the complete `docker-compose.yml` for the ingress.
///
/// The output depends only on `mode` and `layout`, so repeated
/// calls yield identical text.
pub fn render_compose(mode: &IngressMode, layout: &Layout) -> DeployResult<String> {
    let mut command = vec![
        "--api.insecure=true".to_string(),
        "--providers.docker=true".to_string(),
        "--providers.docker.exposedbydefault=false".to_string(),
        "--entrypoints.web.address=:80".to_string(),
    ];
    let mut ports = vec!["80:80".to_string()];
    let mut volumes = vec![Volumes::Simple(DOCKER_SOCKET.to_string())];
    let mut labels = vec![
        "traefik.enable=true".to_string(),
        "traefik.http.routers.traefik.rule=Host(`traefik.localhost`)".to_string(),
        "traefik.http.routers.traefik.service=api@internal".to_string(),
    ];

    match mode {
        IngressMode::Http => {}
        IngressMode::Acme { contact } => {
            command.extend([
                "--entrypoints.websecure.address=:443".to_string(),
                "--entrypoints.web.http.redirections.entryPoint.to=websecure".to_string(),
                "--entrypoints.web.http.redirections.entryPoint.scheme=https".to_string(),
                format!("--certificatesresolvers.{ACME_RESOLVER}.acme.tlschallenge=true"),
                format!("--certificatesresolvers.{ACME_RESOLVER}.acme.email={contact}"),
                format!(
                    "--certificatesresolvers.{ACME_RESOLVER}.acme.storage={LETSENCRYPT_MOUNT}/acme.json"
                ),
            ]);
            ports.push("443:443".to_string());
            volumes.push(Volumes::Simple(format!(
                "{}:{LETSENCRYPT_MOUNT}",
                layout.letsencrypt_dir().display()
            )));
        }
        IngressMode::StaticCert { cert, key } => {
            command.extend([
                "--entrypoints.websecure.address=:443".to_string(),
                format!("--providers.file.directory={DYNAMIC_DIR_IN_CONTAINER}"),
                "--providers.file.watch=true".to_string(),
            ]);
            ports.push("443:443".to_string());
            volumes.extend([
                Volumes::Simple(format!("{}:{CERT_IN_CONTAINER}:ro", cert.display())),
                Volumes::Simple(format!("{}:{KEY_IN_CONTAINER}:ro", key.display())),
                Volumes::Simple(format!(
                    "{}:{DYNAMIC_DIR_IN_CONTAINER}dynamic.yaml:ro",
                    layout.dynamic_file().display()
                )),
            ]);
            labels.extend([
                "traefik.http.routers.traefik.entrypoints=websecure".to_string(),
                "traefik.http.routers.traefik.tls=true".to_string(),
            ]);
        }
    }

    let service = Service {
        image: Some(IMAGE.to_string()),
        command: Some(ComposeCommand::Args(command)),
        ports: Ports::Short(ports),
        volumes,
        labels: Labels::List(labels),
        ..Default::default()
    };

    let mut services = IndexMap::new();
    services.insert(SERVICE_NAME.to_string(), Some(service));

    let compose = Compose {
        services: Services(services),
        networks: external_network(),
        ..Default::default()
    };

    Ok(serde_yaml::to_string(&compose)?)
}

/// Attach the ingress to the shared network instead of letting
/// compose create a per-project one.
fn external_network() -> ComposeNetworks {
    let mut nets = IndexMap::new();
    nets.insert(
        "default".to_string(),
        MapOrEmpty::Map(NetworkSettings {
            name: Some(NETWORK_NAME.to_string()),
            external: Some(ComposeNetwork::Bool(true)),
            ..Default::default()
        }),
    );
    ComposeNetworks(nets)
}

#[derive(Serialize)]
struct DynamicConfig {
    tls: DynamicTls,
}

#[derive(Serialize)]
struct DynamicTls {
    stores: IndexMap<String, TlsStore>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TlsStore {
    default_certificate: DefaultCertificate,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DefaultCertificate {
    cert_file: String,
    key_file: String,
}

/// Render the dynamic configuration pointing Traefik's default
/// TLS store at the mounted certificate pair.
pub fn render_dynamic() -> DeployResult<String> {
    let mut stores = IndexMap::new();
    stores.insert(
        "default".to_string(),
        TlsStore {
            default_certificate: DefaultCertificate {
                cert_file: CERT_IN_CONTAINER.to_string(),
                key_file: KEY_IN_CONTAINER.to_string(),
            },
        },
    );

    Ok(serde_yaml::to_string(&DynamicConfig {
        tls: DynamicTls { stores },
    })?)
}
