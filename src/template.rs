//! Deployment templates: rendering collaborator, files read from disk and the changes the driver
//! applies to a rendered template before submitting it.
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

pub const PUBLIC_TEMPLATE: &str = "public";
pub const INTERNAL_TEMPLATE: &str = "internal";
pub const EMPTY_TEMPLATE: &str = "empty";

const VIRTUAL_MACHINE_TYPE: &str = "Microsoft.Compute/virtualMachines";
const FIRST_LOGON_COMMANDS: &str = r#"<FirstLogonCommands><SynchronousCommand><CommandLine>cmd /c "copy C:\AzureData\CustomData.bin C:\Config.ps1"</CommandLine><Description>copy</Description><Order>1</Order></SynchronousCommand><SynchronousCommand><CommandLine>%windir%\System32\WindowsPowerShell\v1.0\powershell.exe -NoProfile -ExecutionPolicy Bypass -file C:\Config.ps1</CommandLine><Description>script</Description><Order>2</Order></SynchronousCommand></FirstLogonCommands>"#;
const AUTO_LOGON: &str = "[concat('<AutoLogon><Password><Value>', parameters('adminPassword'), '</Value></Password><Enabled>true</Enabled><LogonCount>1</LogonCount><Username>', parameters('adminUserName'), '</Username></AutoLogon>')]";
const ARM_TEMPLATE_SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2019-04-01/deploymentTemplate.json#";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("reading template `{path}`: {error}")]
    Read { path: PathBuf, error: String },
    #[error("template `{name}` is not valid json: {error}")]
    Parse { name: String, error: String },
}

/// Renders a named template with a data context into a deployment template document.
pub trait TemplateRenderer {
    fn render(&self, name: &str, context: &Value) -> Result<Value, TemplateError>;
}

impl<T: TemplateRenderer + ?Sized> TemplateRenderer for &T {
    fn render(&self, name: &str, context: &Value) -> Result<Value, TemplateError> {
        (**self).render(name, context)
    }
}

/// Serves `{dir}/{name}.json`.
///
/// String values of the form `"{{key}}"` are replaced by `context[key]`, so a placeholder
/// can stand for any json value. The `empty` template is built in when no file overrides it.
#[derive(Debug, Clone)]
pub struct FileTemplateRenderer {
    dir: PathBuf,
}

impl FileTemplateRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TemplateRenderer for FileTemplateRenderer {
    fn render(&self, name: &str, context: &Value) -> Result<Value, TemplateError> {
        let path = self.dir.join(format!("{name}.json"));
        if name == EMPTY_TEMPLATE && !path.is_file() {
            return Ok(empty_template());
        }

        let mut template = read_template_file(&path)?;
        substitute(&mut template, context);
        Ok(template)
    }
}

/// Template without resources, used to wipe a resource group in complete mode.
pub fn empty_template() -> Value {
    json!({
        "$schema": ARM_TEMPLATE_SCHEMA,
        "contentVersion": "1.0.0.0",
        "parameters": {},
        "resources": []
    })
}

/// Reads a json template as is.
pub fn read_template_file(path: &Path) -> Result<Value, TemplateError> {
    let content = fs::read_to_string(path).map_err(|e| TemplateError::Read {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| TemplateError::Parse {
        name: path.display().to_string(),
        error: e.to_string(),
    })
}

fn substitute(value: &mut Value, context: &Value) {
    match value {
        Value::String(s) => {
            let key = s
                .strip_prefix("{{")
                .and_then(|rest| rest.strip_suffix("}}"))
                .map(str::trim);
            if let Some(replacement) = key.and_then(|k| context.get(k)) {
                *value = replacement.clone();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| substitute(item, context)),
        Value::Object(map) => map.values_mut().for_each(|item| substitute(item, context)),
        _ => {}
    }
}

/// Disables password logins on every virtual machine of the template and authorises
/// `public_key` for the admin user.
pub fn add_linux_ssh_configuration(template: &mut Value, public_key: &str) {
    let linux_configuration = json!({
        "disablePasswordAuthentication": "true",
        "ssh": {
            "publicKeys": [{
                "path": "[concat('/home/',parameters('adminUsername'),'/.ssh/authorized_keys')]",
                "keyData": public_key
            }]
        }
    });

    let Some(resources) = template.get_mut("resources").and_then(Value::as_array_mut) else {
        return;
    };
    for resource in resources
        .iter_mut()
        .filter(|r| r.get("type").and_then(Value::as_str) == Some(VIRTUAL_MACHINE_TYPE))
    {
        let name = resource.get("name").cloned().unwrap_or_default();
        debug!("adding ssh configuration to {name}");
        if let Some(properties) = resource.get_mut("properties").and_then(Value::as_object_mut) {
            let os_profile = properties.entry("osProfile").or_insert_with(|| json!({}));
            if let Some(os_profile) = os_profile.as_object_mut() {
                os_profile.insert("linuxConfiguration".into(), linux_configuration.clone());
            }
        }
    }
}

/// Runs the base64 `custom_data` script at the first logon of every virtual machine of the
/// template, logging on once as the admin user to do so.
pub fn add_windows_custom_data(template: &mut Value, custom_data: &str) {
    let windows_configuration = json!({
        "additionalUnattendContent": [
            {
                "passName": "oobeSystem",
                "componentName": "Microsoft-Windows-Shell-Setup",
                "settingName": "FirstLogonCommands",
                "content": FIRST_LOGON_COMMANDS
            },
            {
                "passName": "oobeSystem",
                "componentName": "Microsoft-Windows-Shell-Setup",
                "settingName": "AutoLogon",
                "content": AUTO_LOGON
            }
        ]
    });

    for os_profile in virtual_machine_os_profiles(template) {
        os_profile.insert("customData".into(), Value::from(custom_data));
        os_profile.insert("windowsConfiguration".into(), windows_configuration.clone());
    }
}

fn virtual_machine_os_profiles(template: &mut Value) -> Vec<&mut Map<String, Value>> {
    let Some(resources) = template.get_mut("resources").and_then(Value::as_array_mut) else {
        return Vec::new();
    };
    resources
        .iter_mut()
        .filter(|r| r.get("type").and_then(Value::as_str) == Some(VIRTUAL_MACHINE_TYPE))
        .filter_map(|r| r.get_mut("properties").and_then(Value::as_object_mut))
        .filter_map(|properties| {
            properties
                .entry("osProfile")
                .or_insert_with(|| json!({}))
                .as_object_mut()
        })
        .collect()
}
