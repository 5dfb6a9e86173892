mod common;

use std::fs;

use common::{FakeRunner, acme_config, home, http_config, static_config};
use master_builder::error::DeployError;
use master_builder::ingress::template::{render_compose, render_dynamic};
use master_builder::{Docker, FileChange, Ingress, IngressMode, PersistedConfig};

#[test]
fn compose_file_written_once() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = http_config();
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();

    assert_eq!(ingress.ensure_compose_file().unwrap(), FileChange::Created);
    assert_eq!(ingress.ensure_compose_file().unwrap(), FileChange::Unchanged);

    let written = fs::read_to_string(layout.ingress_compose_file()).unwrap();
    assert_eq!(written, render_compose(&IngressMode::Http, &layout).unwrap());
    assert!(fake.calls().is_empty());
}

#[test]
fn compose_file_updated_when_mode_changes() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();

    let http = http_config();
    Ingress::new(&layout, &http, Docker::new(&fake))
        .unwrap()
        .ensure_compose_file()
        .unwrap();

    let acme = acme_config("ops@example.com");
    let ingress = Ingress::new(&layout, &acme, Docker::new(&fake)).unwrap();

    assert_eq!(ingress.ensure_compose_file().unwrap(), FileChange::Updated);
    assert_eq!(ingress.ensure_compose_file().unwrap(), FileChange::Unchanged);

    let written = fs::read_to_string(layout.ingress_compose_file()).unwrap();
    assert!(written.contains("acme.email=ops@example.com"));
    assert!(layout.letsencrypt_dir().is_dir());
}

#[test]
fn hand_edited_compose_file_is_restored() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = http_config();
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();

    ingress.ensure_compose_file().unwrap();
    fs::write(layout.ingress_compose_file(), "services: {}\n").unwrap();

    assert_eq!(ingress.ensure_compose_file().unwrap(), FileChange::Updated);
}

#[test]
fn dynamic_file_follows_static_mode() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();

    let static_cert = static_config("/etc/ssl/site.crt", "/etc/ssl/site.key");
    let ingress = Ingress::new(&layout, &static_cert, Docker::new(&fake)).unwrap();

    assert_eq!(ingress.ensure_dynamic_file().unwrap(), FileChange::Created);
    assert_eq!(ingress.ensure_dynamic_file().unwrap(), FileChange::Unchanged);
    assert_eq!(
        fs::read_to_string(layout.dynamic_file()).unwrap(),
        render_dynamic().unwrap()
    );

    let http = http_config();
    let ingress = Ingress::new(&layout, &http, Docker::new(&fake)).unwrap();

    assert_eq!(ingress.ensure_dynamic_file().unwrap(), FileChange::Deleted);
    assert!(!layout.dynamic_file().exists());
    assert_eq!(ingress.ensure_dynamic_file().unwrap(), FileChange::Unchanged);
}

#[test]
fn stale_dynamic_file_is_updated() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = static_config("/etc/ssl/site.crt", "/etc/ssl/site.key");
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();
    fs::create_dir_all(layout.ingress_dir()).unwrap();
    fs::write(layout.dynamic_file(), "tls: {}\n").unwrap();

    assert_eq!(ingress.ensure_dynamic_file().unwrap(), FileChange::Updated);
    assert_eq!(ingress.ensure_dynamic_file().unwrap(), FileChange::Unchanged);
    assert_eq!(
        fs::read_to_string(layout.dynamic_file()).unwrap(),
        render_dynamic().unwrap()
    );
}

#[test]
fn acme_mode_never_writes_dynamic_file() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = acme_config("ops@example.com");
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();

    assert_eq!(ingress.ensure_dynamic_file().unwrap(), FileChange::Unchanged);
    assert!(!layout.dynamic_file().exists());
}

#[test]
fn network_created_only_when_missing() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new().with_network("bridge");
    let config = http_config();
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();

    assert!(ingress.ensure_network().unwrap());
    assert!(!ingress.ensure_network().unwrap());

    assert_eq!(fake.count("docker network create traefik"), 1);
    assert_eq!(fake.networks(), vec!["bridge", "traefik"]);
}

#[test]
fn existing_network_is_tolerated() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new().with_network("traefik");
    let config = http_config();
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();

    assert!(!ingress.ensure_network().unwrap());
    assert_eq!(fake.count("docker network create traefik"), 0);
}

#[test]
fn start_is_idempotent() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = http_config();
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();

    assert!(ingress.start().unwrap());
    assert!(!ingress.start().unwrap());

    assert_eq!(fake.count("docker compose up -d"), 1);
    assert_eq!(fake.count("docker network create traefik"), 1);
    assert!(fake.is_running(&layout.ingress_dir()));
    assert!(ingress.is_running().unwrap());

    let up = fake
        .calls()
        .into_iter()
        .find(|c| c.command == "docker compose up -d")
        .unwrap();
    assert_eq!(up.cwd, Some(layout.ingress_dir()));
}

#[test]
fn stop_only_when_running() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = http_config();
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();

    assert!(!ingress.stop().unwrap());
    assert_eq!(fake.count("docker compose down"), 0);
    assert!(layout.ingress_compose_file().is_file());

    ingress.start().unwrap();
    assert!(ingress.stop().unwrap());
    assert_eq!(fake.count("docker compose down"), 1);
    assert!(!ingress.is_running().unwrap());
}

#[test]
fn update_restarts_running_proxy() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = http_config();
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();

    ingress.start().unwrap();
    ingress.update().unwrap();

    assert_eq!(
        fake.actions(),
        vec![
            "docker network create traefik",
            "docker compose up -d",
            "docker compose pull",
            "docker compose down",
            "docker compose up -d",
        ]
    );
    assert!(ingress.is_running().unwrap());
}

#[test]
fn update_leaves_stopped_proxy_stopped() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = http_config();
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();

    ingress.update().unwrap();

    assert_eq!(fake.actions(), vec!["docker compose pull"]);
    assert!(!ingress.is_running().unwrap());
}

#[test]
fn failed_status_query_means_not_running() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = http_config();
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();
    fake.set_running(&layout.ingress_dir(), &["traefik"]);
    fake.fail_on("compose ps");

    assert!(!ingress.is_running().unwrap());
}

#[test]
fn other_services_do_not_count_as_proxy() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = http_config();
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();
    fake.set_running(&layout.ingress_dir(), &["traefik-old", "whoami"]);

    assert!(!ingress.is_running().unwrap());
}

#[test]
fn failing_up_surfaces_command_failure() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = http_config();
    let ingress = Ingress::new(&layout, &config, Docker::new(&fake)).unwrap();
    fake.fail_on("compose up");

    let err = ingress.start().unwrap_err();

    assert!(matches!(err, DeployError::CommandFailed { code: Some(1), .. }));
}

#[test]
fn invalid_https_config_is_rejected() {
    let (_tmp, layout) = home();
    let fake = FakeRunner::new();
    let config = PersistedConfig {
        init_done: true,
        enable_https: true,
        ..PersistedConfig::default()
    };

    let err = Ingress::new(&layout, &config, Docker::new(&fake))
        .err()
        .unwrap();

    assert!(matches!(err, DeployError::InvalidConfiguration(_)));
    assert!(!layout.ingress_compose_file().exists());
}
