//! 面向用户的提示文本与按钮

use crate::config::RequiredGroups;
use crate::platform::InlineButton;

/// 重新验证按钮的回调数据
pub const RECHECK_CALLBACK: &str = "verify_recheck";

const RULE: &str = "───────────────────────────────────────";

/// 群内警告统一格式
fn boxed(title: &str, body: &str) -> String {
    format!("```\n{}\n{}\n\n{}\n\n{}\n```", title, RULE, body, RULE)
}

pub fn link_warning(user_name: &str) -> String {
    boxed(
        "⚠️ LINK TERDETEKSI",
        &format!(
            "Link tidak diizinkan di grup ini.\nPesan Anda telah dihapus.\n\nUser: {}",
            user_name
        ),
    )
}

pub fn virtex_warning(user_name: &str) -> String {
    boxed(
        "⚠️ VIRTEX TERDETEKSI",
        &format!("Pesan berbahaya telah dihapus.\n\nUser: {}", user_name),
    )
}

pub fn oversized_warning() -> String {
    "⚠️ Pesan terlalu panjang telah dihapus.".to_string()
}

pub fn spam_warning(user_name: &str) -> String {
    boxed(
        "⚠️ SPAM TERDETEKSI",
        &format!(
            "Anda mengirim pesan terlalu cepat.\nMohon tunggu beberapa detik.\n\nUser: {}",
            user_name
        ),
    )
}

pub fn banned_word_warning(user_name: &str) -> String {
    boxed(
        "⚠️ KATA TERLARANG",
        &format!(
            "Pesan mengandung kata terlarang.\nPesan Anda telah dihapus.\n\nUser: {}",
            user_name
        ),
    )
}

/// 渲染欢迎语：`{name}` 缺省为 `Member`，`{group}` 缺省为 `grup`
pub fn render_welcome(template: &str, member_name: Option<&str>, group_title: Option<&str>) -> String {
    let name = member_name.filter(|n| !n.is_empty()).unwrap_or("Member");
    let group = group_title.filter(|g| !g.is_empty()).unwrap_or("grup");
    template.replace("{name}", name).replace("{group}", group)
}

pub fn welcome(rendered: &str) -> String {
    boxed("👋 SELAMAT DATANG", rendered)
}

pub fn verification_prompt(user_name: &str) -> String {
    format!(
        "⚠️ *Verifikasi Grup Wajib*\n\n\
         Halo *{}* 👋\n\
         Untuk menggunakan *semua fitur premium bot*, pastikan kamu sudah bergabung dengan semua grup resmi di bawah ini.\n\n\
         Silakan tekan tombol berikut untuk bergabung, lalu klik *Verifikasi Ulang*.\n\n\
         Terima kasih 🙏",
        user_name
    )
}

pub fn verification_success(user_name: &str) -> String {
    format!(
        "✅ *Verifikasi Berhasil!*\n\n\
         Halo *{}* 👋\n\
         Selamat! Kamu sudah bergabung ke semua grup wajib.\n\n\
         Sekarang kamu bisa menggunakan seluruh fitur bot ini.\n\n\
         Ketik /start untuk memulai.",
        user_name
    )
}

/// 逐个群组列出加入状态
pub fn verification_incomplete(user_name: &str, statuses: &[(String, bool)]) -> String {
    let lines: Vec<String> = statuses
        .iter()
        .enumerate()
        .map(|(i, (name, joined))| {
            let mark = if *joined { "✅" } else { "❌" };
            format!("{} Grup {}: {}", mark, i + 1, name)
        })
        .collect();

    format!(
        "⚠️ *Verifikasi Belum Selesai*\n\n\
         Halo *{}* 👋\n\n\
         Status keanggotaan grup:\n{}\n\n\
         Pastikan kamu sudah bergabung ke *semua grup* tersebut, lalu tekan *Verifikasi Ulang* kembali.",
        user_name,
        lines.join("\n")
    )
}

pub fn access_revoked() -> String {
    "⚠️ *Akses Dicabut*\n\n\
     Sistem mendeteksi bahwa kamu keluar dari salah satu grup wajib.\n\n\
     Akses bot kamu telah dicabut dan status dikembalikan ke *REGULER* dengan limit *0*.\n\n\
     Silakan bergabung kembali ke semua grup wajib untuk mengaktifkan fitur bot."
        .to_string()
}

/// 每个带邀请链接的必须群组一行加入按钮，最后一行为重新验证
pub fn verification_buttons(groups: &RequiredGroups) -> Vec<Vec<InlineButton>> {
    let mut rows: Vec<Vec<InlineButton>> = groups
        .iter()
        .enumerate()
        .filter_map(|(i, group)| {
            group.link.as_ref().map(|url| {
                vec![InlineButton::Url {
                    text: format!("🜲 Join Grup {} 🜲", i + 1),
                    url: url.clone(),
                }]
            })
        })
        .collect();

    rows.push(vec![InlineButton::Callback {
        text: "🜲 Verifikasi Ulang 🜲".to_string(),
        data: RECHECK_CALLBACK.to_string(),
    }]);
    rows
}
