//! End-to-end tests driving the naming core and storage servers purely through their remote
//! interfaces (real TCP sockets, no direct access to any internal state).

use rmifs_core::naming::{NamingServer, RegistrationStub, ServiceStub};
use rmifs_core::storage::{CommandDispatch, CommandStub, LocalStorageServer, StorageDispatch, StorageStub};
use rmifs_core::{Path, Skeleton};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

async fn start_naming() -> (NamingServer, RegistrationStub, ServiceStub) {
    let server = NamingServer::new(loopback(0), loopback(0)).unwrap();
    server.start().await.unwrap();
    let registration = RegistrationStub::bound_to_skeleton(server.registration_skeleton())
        .await
        .unwrap();
    let service = ServiceStub::bound_to_skeleton(server.service_skeleton()).await.unwrap();
    (server, registration, service)
}

async fn start_storage_server(root: &assert_fs::TempDir) -> (StorageStub, CommandStub) {
    let backing = Arc::new(LocalStorageServer::new(root.path().to_path_buf()));
    let storage_skeleton = Skeleton::new(StorageDispatch::new(Arc::clone(&backing))).unwrap();
    let command_skeleton = Skeleton::new(CommandDispatch::new(backing)).unwrap();
    storage_skeleton.start().await.unwrap();
    command_skeleton.start().await.unwrap();

    let storage = StorageStub::bound_to_skeleton(&storage_skeleton).await.unwrap();
    let command = CommandStub::bound_to_skeleton(&command_skeleton).await.unwrap();
    (storage, command)
}

#[tokio::test]
async fn registration_partitions_claimed_paths_from_fresh_ones() {
    let (_server, registration, _service) = start_naming().await;

    let tmp_a = assert_fs::TempDir::new().unwrap();
    let (storage_a, command_a) = start_storage_server(&tmp_a).await;
    let to_delete_a = registration
        .register(storage_a, command_a, vec![Path::parse("/shared").unwrap()])
        .await
        .unwrap();
    assert!(to_delete_a.is_empty());

    let tmp_b = assert_fs::TempDir::new().unwrap();
    let (storage_b, command_b) = start_storage_server(&tmp_b).await;
    let to_delete_b = registration
        .register(
            storage_b,
            command_b,
            vec![Path::parse("/shared").unwrap(), Path::parse("/only-b").unwrap()],
        )
        .await
        .unwrap();

    assert_eq!(to_delete_b, vec![Path::parse("/shared").unwrap()]);
}

#[tokio::test]
async fn create_file_happy_path_then_read_back_through_storage() {
    let (_server, registration, service) = start_naming().await;
    let tmp = assert_fs::TempDir::new().unwrap();
    let (storage, command) = start_storage_server(&tmp).await;
    registration.register(storage, command, vec![]).await.unwrap();

    let path = Path::parse("/notes/todo").unwrap();
    assert!(service.create_file(&path).await.unwrap());
    assert!(service.is_directory(&Path::parse("/notes").unwrap()).await.unwrap());
    assert!(!service.is_directory(&path).await.unwrap());

    let bound_storage = service.get_storage(&path).await.unwrap();
    bound_storage.write(&path, 0, b"buy milk".to_vec()).await.unwrap();
    assert_eq!(bound_storage.size(&path).await.unwrap(), 8);
    assert_eq!(bound_storage.read(&path, 0, 8).await.unwrap(), b"buy milk".to_vec());
}

#[tokio::test]
async fn create_file_under_missing_parent_fails_not_found() {
    let (_server, registration, service) = start_naming().await;
    let tmp = assert_fs::TempDir::new().unwrap();
    let (storage, command) = start_storage_server(&tmp).await;
    registration.register(storage, command, vec![]).await.unwrap();

    let err = service
        .create_file(&Path::parse("/no/such/dir/file").unwrap())
        .await
        .unwrap_err();
    assert!(err.is_kind(rmifs_core::ErrorKind::NotFound));
}

#[tokio::test]
async fn remote_exception_carries_its_kind_back_to_the_caller_unchanged() {
    let (_server, _registration, service) = start_naming().await;
    let err = service.list(&Path::parse("/nowhere").unwrap()).await.unwrap_err();
    assert!(err.is_kind(rmifs_core::ErrorKind::NotFound));
}

#[tokio::test]
async fn naming_server_cannot_be_started_twice() {
    let (server, _registration, _service) = start_naming().await;
    let err = server.start().await.unwrap_err();
    assert!(err.is_kind(rmifs_core::ErrorKind::IllegalState));
}

#[tokio::test]
async fn delete_file_removes_it_from_the_namespace_and_the_backing_server() {
    let (_server, registration, service) = start_naming().await;
    let tmp = assert_fs::TempDir::new().unwrap();
    let (storage, command) = start_storage_server(&tmp).await;
    registration.register(storage, command, vec![]).await.unwrap();

    let path = Path::parse("/a").unwrap();
    assert!(service.create_file(&path).await.unwrap());
    assert!(service.delete(&path).await.unwrap());
    assert!(service.is_directory(&path).await.is_err());
    assert!(!tmp.path().join("a").exists());
}

#[tokio::test]
async fn delete_directory_recursively_removes_every_descendant() {
    let (_server, registration, service) = start_naming().await;
    let tmp = assert_fs::TempDir::new().unwrap();
    let (storage, command) = start_storage_server(&tmp).await;
    registration.register(storage, command, vec![]).await.unwrap();

    service.create_directory(&Path::parse("/docs").unwrap()).await.unwrap();
    service.create_file(&Path::parse("/docs/a").unwrap()).await.unwrap();
    service.create_file(&Path::parse("/docs/b").unwrap()).await.unwrap();

    assert!(service.delete(&Path::parse("/docs").unwrap()).await.unwrap());
    assert!(service.is_directory(&Path::parse("/docs").unwrap()).await.is_err());
    assert!(service.get_storage(&Path::parse("/docs/a").unwrap()).await.is_err());
    assert!(service.list(&Path::root()).await.unwrap().is_empty());
}

#[tokio::test]
async fn path_nested_directories_are_created_one_level_at_a_time() {
    let (_server, registration, service) = start_naming().await;
    let tmp = assert_fs::TempDir::new().unwrap();
    let (storage, command) = start_storage_server(&tmp).await;
    registration.register(storage, command, vec![]).await.unwrap();

    let deep: Path = "/a/b/c".parse().unwrap();
    assert_eq!(deep.to_string(), "/a/b/c");

    // Creating a deeply nested directory before its parents exist fails...
    assert!(service.create_directory(&deep).await.is_err());

    // ...but succeeds once each level is created in turn.
    assert!(service.create_directory(&deep.parent().unwrap().parent().unwrap()).await.unwrap());
    assert!(service.create_directory(&deep.parent().unwrap()).await.unwrap());
    assert!(service.create_directory(&deep).await.unwrap());
    assert!(service.is_directory(&deep).await.unwrap());
}
