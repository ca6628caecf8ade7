// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Trellis 服务端
//!
//! 基于 Tokio 运行时的多线程 HTTP/1.1 服务端，承载请求流水线：
//! - 启动时一次性载入配置、本地化表与处理器注册表，之后只读共享
//! - 每个连接在独立任务中解析请求、执行流水线并按 Accept-Encoding 压缩响应
//! - 后台管理控制台（CLI 指令交互）

use trellis::{
    exception::Exception, handlers, param::HttpRequestMethod, Config, Pipeline, Request, Response,
};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    runtime::Builder,
};

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::{Arc, Mutex},
    time::Instant,
};

/// # 程序入口点
///
/// 初始化日志、加载配置与本地化表、构建运行时并启动主事件循环。
fn main() {
    // 1. 初始化日志系统：通过外部 YAML 配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    // 2. 配置加载：缺失或非法均为致命错误
    let config = match Config::from_toml("config/development.toml") {
        Ok(config) => config,
        Err(e) => fatal(e),
    };
    info!("配置文件已载入，站点根目录：{}", config.root());

    // 3. 异步运行时：工作线程数由配置决定
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            panic!("无法创建异步运行时：{}", e);
        }
    };

    // 4. 流水线：本地化表缺失是致命错误，缓存层失败只会降级
    let pipeline = match Pipeline::bootstrap(config, handlers::registry()) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => fatal(e),
    };

    runtime.block_on(serve(pipeline));
}

fn fatal(e: Exception) -> ! {
    if !e.is_fatal() {
        warn!("启动阶段出现非致命异常：{}", e);
    }
    error!("启动失败：{}", e);
    panic!("启动失败：{}", e);
}

async fn serve(pipeline: Arc<Pipeline>) {
    // 5. 网络层初始化：全地址监听 (0.0.0.0) 或本地回环监听 (127.0.0.1)
    let port = pipeline.config().port();
    let address = match pipeline.config().local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    info!("服务端将在{}:{}上监听Socket连接", address, port);
    let socket = SocketAddrV4::new(address, port);

    let listener = match TcpListener::bind(socket).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            panic!("无法绑定端口：{}，错误：{}", port, e);
        }
    };
    info!("端口{}绑定完成", port);

    // 6. 生命周期管理：停机标志与活跃连接计数
    let shutdown_flag = Arc::new(Mutex::new(false));
    let active_connection = Arc::new(Mutex::new(0u32));

    // 7. 交互式管理控制台
    tokio::spawn(console(
        Arc::clone(&pipeline),
        Arc::clone(&shutdown_flag),
        Arc::clone(&active_connection),
    ));

    let mut id: u128 = 0;

    // 8. 主事件循环
    loop {
        if *lock(&shutdown_flag) {
            info!("主循环接收到停机指令，正在退出...");
            break;
        }

        let (mut stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("接受连接失败：{}", e);
                continue;
            }
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let active_connection = Arc::clone(&active_connection);
        let pipeline = Arc::clone(&pipeline);

        tokio::spawn(async move {
            *lock(&active_connection) += 1;
            handle_connection(&mut stream, id, &pipeline).await;
            *lock(&active_connection) -= 1;
        });
        id += 1;
    }
}

/// 获取互斥锁，锁被污染时恢复并继续
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("互斥锁被污染，恢复并继续");
            poisoned.into_inner()
        }
    }
}

async fn console(
    pipeline: Arc<Pipeline>,
    shutdown_flag: Arc<Mutex<bool>>,
    active_connection: Arc<Mutex<u32>>,
) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match input.trim() {
            "stop" => {
                *lock(&shutdown_flag) = true;
                println!("停机指令已激活，服务器将在处理完下一个请求后关闭...");
                break;
            }
            "help" => {
                println!("== Trellis Help ==");
                println!("stop     - 发出停机信号");
                println!("status   - 查看当前服务器运行状态");
                println!("purge    - 清空页面缓存");
                println!("manifest - 重新生成离线清单");
                println!("help     - 显示此帮助信息");
                println!("==================");
            }
            "status" => {
                let config = pipeline.config();
                println!("== Trellis 状态 ===");
                println!("当前活跃连接数: {}", *lock(&active_connection));
                println!("调试模式: {}", config.is_debug());
                println!("页面缓存: {}", pipeline.pages().is_enabled());
                println!(
                    "内存缓存: {}（{}条）",
                    pipeline.memory().can_mem_cache(),
                    pipeline.memory().len()
                );
                println!("==================");
            }
            "purge" => match pipeline.purge_pages() {
                Ok(removed) => println!("已删除{}个缓存页面", removed),
                Err(e) => println!("清空页面缓存失败：{}", e),
            },
            "manifest" => match pipeline.write_manifest() {
                Ok(size) => println!("离线清单已生成，共{}字节", size),
                Err(e) => println!("生成离线清单失败：{}", e),
            },
            cmd => println!("无效的命令：{}", cmd),
        }
    }
}

/// # 连接处理器
///
/// 读取并解析请求，执行流水线，按方法与 Accept-Encoding 调整响应后发送。
async fn handle_connection(stream: &mut TcpStream, id: u128, pipeline: &Pipeline) {
    let mut buffer = vec![0; 8192];

    if let Err(e) = stream.readable().await {
        error!("[ID{}]等待TCPStream可读时遇到错误: {}", id, e);
        return;
    }
    match stream.try_read(&mut buffer) {
        Ok(0) => return,
        Err(e) => {
            error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
            return;
        }
        _ => {}
    }
    debug!("[ID{}]HTTP请求接收完毕", id);

    let start_time = Instant::now();

    let request = match Request::try_from(&buffer, id) {
        Ok(request) => request,
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败: {}", id, e);
            let code = match e {
                Exception::UnSupportedRequestMethod => 405,
                _ => 400,
            };
            send(stream, id, &Response::from_status_code(code)).await;
            return;
        }
    };

    // OPTIONS 不进入流水线
    let response = match request.method() {
        HttpRequestMethod::Options => Response::from_status_code(204),
        HttpRequestMethod::Head => pipeline.handle(&request, id).head_only(),
        _ => pipeline
            .handle(&request, id)
            .encode(request.accept_encoding(), id),
    };

    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );
    info!(
        "[ID{}] {}, {}, {}, {}, {}, {}",
        id,
        request.version(),
        request.path(),
        request.method(),
        response.status_code(),
        response.information(),
        request.user_agent(),
    );

    send(stream, id, &response).await;
}

async fn send(stream: &mut TcpStream, id: u128, response: &Response) {
    let bytes = response.as_bytes();
    debug!("[ID{}]发送响应，长度: {}", id, bytes.len());
    if let Err(e) = stream.write_all(&bytes).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    let _ = stream.flush().await;
}
