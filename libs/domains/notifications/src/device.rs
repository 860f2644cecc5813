//! Device push token management.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::NotificationResult;
use crate::models::{DevicePushToken, PushPlatform};
use crate::repository::DeviceTokenRepository;

/// Device registration request.
#[derive(Debug, Clone)]
pub struct RegisterDevice {
    pub user_id: Uuid,
    pub device_id: String,
    pub platform: PushPlatform,
    pub token: String,
}

/// Service for managing device push tokens.
pub struct DeviceService<D> {
    devices: Arc<D>,
}

impl<D> DeviceService<D>
where
    D: DeviceTokenRepository,
{
    pub fn new(devices: Arc<D>) -> Self {
        Self { devices }
    }

    /// Register (or refresh) a device's push token.
    ///
    /// Upserts the (device_id, platform) row with the new token and
    /// reactivates it, then deactivates the device's other tokens. Other
    /// devices of the same user are untouched.
    pub async fn register_device(
        &self,
        request: RegisterDevice,
    ) -> NotificationResult<DevicePushToken> {
        info!(
            user_id = %request.user_id,
            device_id = %request.device_id,
            platform = %request.platform,
            "Registering device"
        );

        let mut device = match self
            .devices
            .find_by_device(&request.device_id, request.platform)
            .await?
        {
            Some(existing) => existing,
            None => DevicePushToken::new(
                request.user_id,
                request.device_id.clone(),
                request.platform,
                request.token.clone(),
            ),
        };

        // Device may have changed hands
        device.user_id = request.user_id;
        device.token = request.token;
        device.activate(Utc::now());
        self.devices.save(&device).await?;

        let deactivated = self
            .devices
            .deactivate_siblings(&device.device_id, device.platform, device.id)
            .await?;
        if deactivated > 0 {
            debug!(
                device_id = %device.device_id,
                count = deactivated,
                "Deactivated prior tokens for device"
            );
        }

        Ok(device)
    }

    /// Explicitly deactivate a device token (unregister).
    pub async fn deactivate_device(&self, id: Uuid) -> NotificationResult<()> {
        if let Some(mut device) = self.devices.find_by_id(id).await? {
            device.deactivate(Utc::now());
            self.devices.save(&device).await?;
            info!(device_token_id = %id, "Deactivated device token");
        }
        Ok(())
    }

    /// All active, non-revoked tokens of a user.
    pub async fn active_tokens(&self, user_id: Uuid) -> NotificationResult<Vec<DevicePushToken>> {
        self.devices.find_active_by_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDeviceTokenRepository;

    fn service() -> (Arc<MemoryDeviceTokenRepository>, DeviceService<MemoryDeviceTokenRepository>) {
        let repo = Arc::new(MemoryDeviceTokenRepository::new());
        (Arc::clone(&repo), DeviceService::new(repo))
    }

    #[tokio::test]
    async fn test_registration_refreshes_existing_device_row() {
        let (_repo, service) = service();
        let user = Uuid::new_v4();

        let first = service
            .register_device(RegisterDevice {
                user_id: user,
                device_id: "dev-1".to_string(),
                platform: PushPlatform::Fcm,
                token: "tok-old".to_string(),
            })
            .await
            .unwrap();

        let second = service
            .register_device(RegisterDevice {
                user_id: user,
                device_id: "dev-1".to_string(),
                platform: PushPlatform::Fcm,
                token: "tok-new".to_string(),
            })
            .await
            .unwrap();

        // Same row, refreshed token
        assert_eq!(first.id, second.id);
        assert_eq!(second.token, "tok-new");
        assert!(second.is_active());

        let active = service.active_tokens(user).await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_registration_reactivates_revoked_device() {
        let (repo, service) = service();
        let user = Uuid::new_v4();

        let mut token = DevicePushToken::new(user, "dev-1", PushPlatform::Apns, "tok-1");
        token.revoke(Utc::now());
        repo.save(&token).await.unwrap();
        assert!(service.active_tokens(user).await.unwrap().is_empty());

        let registered = service
            .register_device(RegisterDevice {
                user_id: user,
                device_id: "dev-1".to_string(),
                platform: PushPlatform::Apns,
                token: "tok-2".to_string(),
            })
            .await
            .unwrap();

        assert!(registered.is_active());
        assert!(registered.revoked_at.is_none());
        assert_eq!(service.active_tokens(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_devices_of_same_user_keep_their_tokens() {
        let (_repo, service) = service();
        let user = Uuid::new_v4();

        for device in ["phone", "tablet"] {
            service
                .register_device(RegisterDevice {
                    user_id: user,
                    device_id: device.to_string(),
                    platform: PushPlatform::Fcm,
                    token: format!("tok-{device}"),
                })
                .await
                .unwrap();
        }

        let active = service.active_tokens(user).await.unwrap();
        assert_eq!(active.len(), 2);
    }

    #[tokio::test]
    async fn test_deactivate_device() {
        let (_repo, service) = service();
        let user = Uuid::new_v4();

        let registered = service
            .register_device(RegisterDevice {
                user_id: user,
                device_id: "dev-1".to_string(),
                platform: PushPlatform::Fcm,
                token: "tok-1".to_string(),
            })
            .await
            .unwrap();

        service.deactivate_device(registered.id).await.unwrap();
        assert!(service.active_tokens(user).await.unwrap().is_empty());
    }
}
