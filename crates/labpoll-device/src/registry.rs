use crate::db::device;
use crate::Result;
use labpoll_types::{Device, DeviceAddress, DeviceKind};
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 设备注册表
///
/// 持久化设备身份与种类；增删都是幂等的单语句操作
pub struct DeviceRegistry {
    /// 数据库连接
    pub(crate) db: Arc<DatabaseConnection>,

    /// 内存缓存（地址 -> 设备信息）
    cache: Arc<RwLock<HashMap<DeviceAddress, Device>>>,

    /// 是否启用缓存
    cache_enabled: bool,
}

impl DeviceRegistry {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_enabled: true,
        }
    }

    /// 创建不启用缓存的设备注册表（用于测试）
    #[cfg(test)]
    pub fn new_without_cache(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_enabled: false,
        }
    }

    /// 新增或更新设备
    pub async fn upsert(&self, device: &Device) -> Result<()> {
        let active_model = device::ActiveModel::from(device);

        device::Entity::insert(active_model)
            .on_conflict(
                OnConflict::columns([device::Column::IpAddress, device::Column::Port])
                    .update_columns([
                        device::Column::Label,
                        device::Column::DeviceType,
                        device::Column::RefreshRate,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        info!(
            device = %device.address,
            device_type = %device.kind,
            label = ?device.label,
            "Device saved"
        );

        if self.cache_enabled {
            let mut cache = self.cache.write().await;
            cache.insert(device.address, device.clone());
        }

        Ok(())
    }

    /// 删除设备，测量数据级联删除
    ///
    /// 设备不存在时返回 `false`
    pub async fn remove(&self, address: &DeviceAddress) -> Result<bool> {
        let result = device::Entity::delete_by_id((address.ip.to_string(), i32::from(address.port)))
            .exec(&*self.db)
            .await?;

        if self.cache_enabled {
            let mut cache = self.cache.write().await;
            cache.remove(address);
        }

        let removed = result.rows_affected > 0;
        info!(device = %address, removed, "Device removed");
        Ok(removed)
    }

    /// 获取设备信息
    pub async fn get(&self, address: &DeviceAddress) -> Result<Option<Device>> {
        if self.cache_enabled {
            let cache = self.cache.read().await;
            if let Some(device) = cache.get(address) {
                debug!(device = %address, "Device found in cache");
                return Ok(Some(device.clone()));
            }
        }

        let model = device::Entity::find_by_id((address.ip.to_string(), i32::from(address.port)))
            .one(&*self.db)
            .await?;

        let Some(model) = model else {
            debug!(device = %address, "Device not found");
            return Ok(None);
        };

        let device = Device::try_from(model)?;
        if self.cache_enabled {
            let mut cache = self.cache.write().await;
            cache.insert(device.address, device.clone());
        }
        Ok(Some(device))
    }

    /// 查询设备种类
    pub async fn kind_of(&self, address: &DeviceAddress) -> Result<Option<DeviceKind>> {
        Ok(self.get(address).await?.map(|device| device.kind))
    }

    /// 加载全部设备
    ///
    /// 无法识别的记录（未知种类、非法地址）记日志后跳过
    pub async fn load_all(&self) -> Result<Vec<Device>> {
        let models = device::Entity::find()
            .order_by_asc(device::Column::IpAddress)
            .order_by_asc(device::Column::Port)
            .all(&*self.db)
            .await?;

        let mut devices = Vec::with_capacity(models.len());
        for model in models {
            match Device::try_from(model) {
                Ok(device) => devices.push(device),
                Err(e) => warn!(error = %e, "Skipping device record"),
            }
        }

        if self.cache_enabled {
            let mut cache = self.cache.write().await;
            cache.clear();
            cache.extend(devices.iter().map(|d| (d.address, d.clone())));
        }

        debug!(count = devices.len(), "Devices loaded from database");
        Ok(devices)
    }
}
