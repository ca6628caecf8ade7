//! 随二进制一同注册的示例处理器

use log::debug;

use crate::controller::{Context, Controller, HandlerRegistry};
use crate::exception::Exception;
use crate::response::Response;
use crate::util::escape_attr;

/// 站点首页，访问次数保存在共享内存缓存中
pub struct Index;

impl Controller for Index {
    fn on_index(&mut self, ctx: &mut Context, params: &[String]) -> Result<Response, Exception> {
        let visits = if ctx.memory().can_mem_cache() {
            let visits = ctx.memory().get::<u64>("index.visits").unwrap_or(0) + 1;
            ctx.memory()
                .set("index.visits", &visits, ctx.config().cache_ttl());
            Some(visits)
        } else {
            None
        };
        let greeting = ctx
            .lang()
            .lookup("greeting", false)
            .unwrap_or("Welcome")
            .to_string();

        let doc = ctx.output()?;
        doc.set_style("site");
        doc.set_script("site");
        doc.set_metadata("description", &greeting, false);

        let mut body = format!("<main>\n<h1>{}</h1>\n", greeting);
        if !params.is_empty() {
            body.push_str(&format!("<p>{}</p>\n", escape_attr(&params.join(" / "))));
        }
        if let Some(visits) = visits {
            body.push_str(&format!("<p>visits: {}</p>\n", visits));
        }
        body.push_str("</main>");
        ctx.render(&body)
    }
}

/// 用户编辑页：默认动作读取视图，`onSave` 以 JSON 回显参数
pub struct Edit;

impl Controller for Edit {
    fn on_index(&mut self, ctx: &mut Context, _params: &[String]) -> Result<Response, Exception> {
        ctx.output()?.set_title("Edit user");
        ctx.render_view()
    }

    fn actions(&self) -> &'static [&'static str] {
        &["onSave"]
    }

    fn on_action(
        &mut self,
        action: &str,
        ctx: &mut Context,
        params: &[String],
    ) -> Result<Response, Exception> {
        match action {
            "onSave" => {
                let Some(id) = params.first() else {
                    return Err(Exception::fault_titled(
                        10,
                        "missing user id",
                        "Save failed",
                    ));
                };
                debug!("保存用户{}", id);
                let payload = serde_json::json!({ "saved": id, "rest": &params[1..] });
                ctx.display(payload.to_string(), "application/json")
            }
            _ => self.on_index(ctx, params),
        }
    }
}

fn index() -> Box<dyn Controller> {
    Box::new(Index)
}

fn edit() -> Box<dyn Controller> {
    Box::new(Edit)
}

pub fn registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .controller("/", "index", index)
        .group("/users")
        .controller("/users", "edit", edit)
        .module("/users", "helpers")
}
