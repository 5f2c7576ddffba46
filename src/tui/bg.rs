use cursive::{
    align::HAlign,
    theme::{ColorStyle, Effect, PaletteColor},
    views::TextView,
    Printer, Vec2, View,
};

/// Full screen backdrop with a title, a status line and a dim footer.
pub struct Backdrop {
    title: TextView,
    status: TextView,
    footer: TextView,
}

impl Backdrop {
    pub fn new(title: &str, status: &str, footer: &str) -> Self {
        Self {
            title: TextView::new(title).style(Effect::Bold),
            status: TextView::new(status).h_align(HAlign::Right),
            footer: TextView::new(footer)
                .h_align(HAlign::Right)
                .style(Effect::Dim),
        }
    }

    fn printer_at<'a, 'b>(printer: &Printer<'a, 'b>, row: usize) -> Printer<'a, 'b> {
        let mut sub_printer = printer.offset((1, row)).shrinked((1, 0));
        sub_printer.set_color(ColorStyle::new(
            PaletteColor::View,
            PaletteColor::Background,
        ));
        sub_printer
    }
}

impl View for Backdrop {
    fn draw(&self, printer: &Printer) {
        let sub_printer = Self::printer_at(printer, 1);
        self.title.draw(&sub_printer);
        self.status.draw(&sub_printer);

        let sub_printer = Self::printer_at(printer, printer.size.y.saturating_sub(2));
        self.footer.draw(&sub_printer);
    }

    fn layout(&mut self, size: Vec2) {
        let inner = Vec2::new(size.x.saturating_sub(2), size.y.saturating_sub(1));

        self.title.layout(inner);
        self.status.layout(inner);
        self.footer.layout(inner);
    }

    fn needs_relayout(&self) -> bool {
        self.title.needs_relayout() || self.status.needs_relayout() || self.footer.needs_relayout()
    }

    fn required_size(&mut self, constraint: Vec2) -> Vec2 {
        constraint
    }
}
