// Static About and Contact pages

use gtk4::prelude::*;
use gtk4::{Align, Box as GtkBox, ContentFit, Label, LinkButton, Orientation, Picture};

use crate::config::Config;

pub struct Profile {
    pub name: &'static str,
    pub study: &'static str,
    pub location: &'static str,
    pub tagline: &'static str,
}

pub const PROFILE: Profile = Profile {
    name: "Viktor Lundin",
    study: "Student, Master in Computer and Information Engineering",
    location: "Uppsala, Sweden",
    tagline: "From the sun, 10^45 photons are emitted every second. \
              I steal a couple of them to capture a moment in time.",
};

fn page_box() -> GtkBox {
    let page = GtkBox::new(Orientation::Vertical, 12);
    page.set_halign(Align::Center);
    page.set_valign(Align::Start);
    page.set_margin_top(32);
    page.set_margin_bottom(32);
    page.add_css_class("static-page");
    page
}

fn text(content: &str, class: &str) -> Label {
    let label = Label::new(Some(content));
    label.set_wrap(true);
    label.set_justify(gtk4::Justification::Center);
    label.set_max_width_chars(60);
    label.add_css_class(class);
    label
}

pub fn about_page(config: &Config) -> GtkBox {
    let page = page_box();

    if let Some(path) = config.avatar_path.as_deref() {
        if path.exists() {
            let avatar = Picture::for_file(&gio::File::for_path(path));
            avatar.set_content_fit(ContentFit::Cover);
            avatar.set_can_shrink(true);
            avatar.set_size_request(160, 160);
            avatar.set_halign(Align::Center);
            avatar.set_overflow(gtk4::Overflow::Hidden);
            avatar.set_alternative_text(Some(PROFILE.name));
            avatar.add_css_class("avatar");
            page.append(&avatar);
        } else {
            tracing::warn!(path = %path.display(), "Avatar image not found");
        }
    }

    page.append(&text(PROFILE.name, "about-name"));
    page.append(&text(PROFILE.study, "about-line"));
    page.append(&text(PROFILE.location, "about-line"));

    let tagline = text(PROFILE.tagline, "about-tagline");
    tagline.set_margin_top(40);
    page.append(&tagline);
    page
}

pub fn mailto_uri(address: &str) -> String {
    format!("mailto:{}", address.trim())
}

pub fn contact_page(config: &Config) -> GtkBox {
    let page = page_box();
    page.append(&text("Get in touch", "about-name"));
    page.append(&text(
        "For prints, collaborations or just to say hi, send me an e-mail.",
        "about-line",
    ));

    let email = LinkButton::with_label(&mailto_uri(&config.contact_email), &config.contact_email);
    email.set_halign(Align::Center);
    email.add_css_class("contact-link");
    page.append(&email);

    page.append(&text(PROFILE.location, "about-line"));
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailto_uri() {
        assert_eq!(mailto_uri(" me@example.org "), "mailto:me@example.org");
    }

    #[test]
    fn test_profile_tagline_single_spaced() {
        assert!(!PROFILE.tagline.contains("  "));
        assert!(PROFILE.tagline.ends_with("moment in time."));
    }
}
