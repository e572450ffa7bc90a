mod common;

use common::*;
use reqwest::StatusCode;
use vddk_builder_build::RegistryCredentials;
use vddk_builder_build::testing::{BuildGate, RecordingBuilder};

/// 認可なしモードでのアップロードからプッシュまでの一連の流れ
#[tokio::test]
async fn test_upload_builds_and_pushes_default_image() {
    let server = TestServer::start().await;

    let response = server
        .upload("", None, "context.tar.gz", vddk_context())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let expected_path = server.upload_dir.join("context.tar.gz");
    assert_eq!(
        response.text().await.unwrap(),
        format!("File uploaded successfully: {}\n", expected_path.display())
    );

    server.wait_until_idle().await;

    let builds = server.builder.calls();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].tag, "registry.local:5000/vddk");
    assert_eq!(builds[0].context_dir, server.staging_dir);
    assert_eq!(
        builds[0].files,
        vec!["Containerfile.vddk", "vmware-vix-disklib-distrib"]
    );

    let pushes = server.pusher.calls();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].tag, "registry.local:5000/vddk");
    assert_eq!(pushes[0].credentials, None);

    // 後片付け: 展開先もアップロードファイルも残らない
    assert!(!server.staging_dir.exists());
    assert!(server.uploaded_files().is_empty());
}

#[tokio::test]
async fn test_upload_image_override() {
    let server = TestServer::start().await;

    let response = server
        .upload("?image=custom-vddk:8.0.1", None, "context.tar.gz", vddk_context())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    server.wait_until_idle().await;

    assert_eq!(
        server.pusher.pushed_tags(),
        vec!["registry.local:5000/custom-vddk:8.0.1"]
    );
}

#[tokio::test]
async fn test_upload_empty_image_uses_default() {
    let server = TestServer::start().await;

    let response = server
        .upload("?image=", None, "context.tar.gz", vddk_context())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    server.wait_until_idle().await;

    assert_eq!(server.pusher.pushed_tags(), vec!["registry.local:5000/vddk"]);
}

#[tokio::test]
async fn test_upload_requires_bearer_token() {
    let server = TestServer::with_options(ServerOptions {
        require_auth: true,
        ..ServerOptions::default()
    })
    .await;

    let response = server
        .upload("", None, "context.tar.gz", vddk_context())
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.text().await.unwrap(), "Missing bearer token\n");
    assert!(!server.slot.is_busy());
    assert!(server.uploaded_files().is_empty());
    assert!(server.reviewer.calls().is_empty());
    assert!(server.builder.calls().is_empty());
}

#[tokio::test]
async fn test_upload_with_denied_token() {
    let server = TestServer::with_options(ServerOptions {
        require_auth: true,
        ..ServerOptions::default()
    })
    .await;

    let response = server
        .upload("", Some(VIEWER_TOKEN), "context.tar.gz", vddk_context())
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.text().await.unwrap(),
        "Insufficient permissions to list namespaces\n"
    );
    assert!(!server.slot.is_busy());
    assert!(server.uploaded_files().is_empty());
}

#[tokio::test]
async fn test_upload_when_permission_check_fails() {
    let server = TestServer::with_options(ServerOptions {
        require_auth: true,
        ..ServerOptions::default()
    })
    .await;

    let response = server
        .upload("", Some(BROKEN_TOKEN), "context.tar.gz", vddk_context())
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.text().await.unwrap(), "Failed to verify permissions\n");
    assert!(!server.slot.is_busy());
}

/// 許可されたトークンはそのままプッシュの認証情報になる
#[tokio::test]
async fn test_upload_with_granted_token_pushes_with_credential() {
    let server = TestServer::with_options(ServerOptions {
        require_auth: true,
        ..ServerOptions::default()
    })
    .await;

    let response = server
        .upload("", Some(ADMIN_TOKEN), "context.tar.gz", vddk_context())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    server.wait_until_idle().await;

    assert_eq!(
        server.reviewer.calls(),
        vec![(
            ADMIN_TOKEN.to_string(),
            "list".to_string(),
            "namespaces".to_string()
        )]
    );
    let pushes = server.pusher.calls();
    assert_eq!(pushes.len(), 1);
    assert_eq!(
        pushes[0].credentials,
        Some(RegistryCredentials::from_token(ADMIN_TOKEN))
    );
}

#[tokio::test]
async fn test_second_upload_is_rejected_while_building() {
    let gate = BuildGate::new();
    let server = TestServer::with_options(ServerOptions {
        builder: RecordingBuilder::gated(gate.clone()),
        ..ServerOptions::default()
    })
    .await;

    let first = server
        .upload("", None, "first.tar.gz", vddk_context())
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    gate.wait_started().await;

    let second = server
        .upload("", None, "second.tar.gz", vddk_context())
        .await;
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        second.text().await.unwrap(),
        "Server is busy processing another build. Please try again later.\n"
    );
    // 拒否されたアップロードは保存されない
    assert_eq!(server.uploaded_files(), vec!["first.tar.gz"]);

    gate.release();
    server.wait_until_idle().await;
    assert_eq!(server.builder.calls().len(), 1);

    // gated ビルダーは毎回ゲートで止まるので、3 回目も解放してから待つ
    let third = server
        .upload("", None, "third.tar.gz", vddk_context())
        .await;
    assert_eq!(third.status(), StatusCode::OK);
    gate.wait_started().await;
    gate.release();
    server.wait_until_idle().await;
    assert_eq!(server.builder.calls().len(), 2);
}

/// 壊れたアーカイブでも受付は成功し、ビルドは走らず後片付けされる
#[tokio::test]
async fn test_corrupt_upload_is_accepted_and_cleaned_up() {
    let server = TestServer::start().await;

    let response = server
        .upload(
            "",
            None,
            "context.tar.gz",
            b"this is not a gzip archive".to_vec(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    server.wait_until_idle().await;

    assert!(server.builder.calls().is_empty());
    assert!(server.pusher.pushed_tags().is_empty());
    assert!(!server.staging_dir.exists());
    assert!(server.uploaded_files().is_empty());
}

#[tokio::test]
async fn test_failed_build_releases_slot() {
    let server = TestServer::with_options(ServerOptions {
        builder: RecordingBuilder::failing("exit status: 125"),
        ..ServerOptions::default()
    })
    .await;

    for _ in 0..3 {
        let response = server
            .upload("", None, "context.tar.gz", vddk_context())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        server.wait_until_idle().await;
    }

    assert_eq!(server.builder.calls().len(), 3);
    assert!(server.pusher.pushed_tags().is_empty());
    assert!(!server.staging_dir.exists());
}

#[tokio::test]
async fn test_upload_file_name_is_reduced_to_last_component() {
    let server = TestServer::start().await;

    let response = server
        .upload("", None, "../../escape.tar.gz", vddk_context())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let expected_path = server.upload_dir.join("escape.tar.gz");
    assert_eq!(
        response.text().await.unwrap(),
        format!("File uploaded successfully: {}\n", expected_path.display())
    );
    server.wait_until_idle().await;
    assert_eq!(server.builder.calls().len(), 1);
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let server = TestServer::start().await;

    let form = reqwest::multipart::Form::new().text("comment", "no archive here");
    let response = server
        .client
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "Failed to parse file\n");
    assert!(!server.slot.is_busy());
    assert!(server.builder.calls().is_empty());
}

#[tokio::test]
async fn test_upload_with_non_multipart_body() {
    let server = TestServer::start().await;

    let response = server
        .client
        .post(server.url("/upload"))
        .body("plain text")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!server.slot.is_busy());
}

#[tokio::test]
async fn test_upload_rejects_other_methods() {
    let server = TestServer::start().await;

    let response = server.client.get(server.url("/upload")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = server.client.put(server.url("/upload")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(!server.slot.is_busy());
}

/// 保存先に書けなければ 500 を返し、スロットを解放する
#[tokio::test]
async fn test_upload_when_upload_dir_is_missing() {
    let server = TestServer::start().await;
    std::fs::remove_dir_all(&server.upload_dir).unwrap();

    let response = server
        .upload("", None, "context.tar.gz", vddk_context())
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.text().await.unwrap(), "Failed to save file\n");
    assert!(!server.slot.is_busy());
    assert!(!server.upload_dir.exists());
    assert!(server.builder.calls().is_empty());
}

/// 上限を超えたボディは 400 になり、書きかけのファイルは残らない
#[tokio::test]
async fn test_upload_over_body_limit() {
    let server = TestServer::with_options(ServerOptions {
        upload_max_bytes: 1024,
        ..ServerOptions::default()
    })
    .await;

    let response = server
        .upload("", None, "context.tar.gz", vec![0xA5; 32 * 1024])
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "Failed to parse file\n");
    assert!(!server.slot.is_busy());
    assert!(server.uploaded_files().is_empty());
    assert!(server.builder.calls().is_empty());

    // 上限内のアップロードは引き続き受け付ける
    let small = build_context(&[("Containerfile.vddk", "FROM scratch\n")]);
    assert!(small.len() < 1024);
    let response = server.upload("", None, "small.tar.gz", small).await;
    assert_eq!(response.status(), StatusCode::OK);
    server.wait_until_idle().await;
}
