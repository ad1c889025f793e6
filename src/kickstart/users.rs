//! Root password and user account directives

use crate::config::UsersConfig;
use crate::kickstart::write_file;
use crate::utils::error::Result;
use tracing::info;

/// Render the credentials file
///
/// With `crypted`, passwords are expected to come from `openssl passwd -6`
/// (or `-5`) and are passed through with `--iscrypted`.
pub fn render_users_file(users: &UsersConfig) -> String {
    let crypted = if users.crypted { "--iscrypted " } else { "" };
    format!(
        "rootpw {crypted}{root}\nuser --name {name} {crypted}--password={password}\n",
        crypted = crypted,
        root = users.root_password,
        name = users.name,
        password = users.password,
    )
}

pub fn write_users_file(path: &str, content: &str) -> Result<()> {
    info!("Setting up password file {}", path);
    write_file(path, content)
}
